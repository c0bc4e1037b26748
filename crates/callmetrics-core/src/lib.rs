//! callmetrics-core: batch analysis of store-grouped sales-call metrics
//!
//! This crate loads tabular sales data and computes, per product column:
//! Pearson correlations against the configured behavioral metrics, an
//! intra-class correlation from a null random-intercept model, and a
//! random-intercept linear mixed model with per-metric Wald inference.
//! Results assemble into a three-sheet spreadsheet report.

pub mod correlation;
pub mod engine;
pub mod errors;
pub mod models;
pub mod report;
pub mod table;
pub mod types;

pub use errors::{StatsError, StatsResult};
pub use types::*;
