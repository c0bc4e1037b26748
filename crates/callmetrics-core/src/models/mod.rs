//! Mixed-effects model implementations

mod icc;
mod lmm;

pub use icc::{estimate_icc, IccEstimate};
pub use lmm::fit_lmm;
