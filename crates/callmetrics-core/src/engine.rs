//! Batch analysis over product columns
//!
//! Runs the correlation / ICC / LMM pipeline for every configured product,
//! strictly sequentially and in configuration order. Model-fitting failures
//! are recoverable per product: they surface through the observer, leave a
//! gap in that product's results, and never abort the batch. The engine
//! performs no I/O and emits no logs of its own.

use crate::correlation::pearson;
use crate::errors::{StatsError, StatsResult};
use crate::models::{estimate_icc, fit_lmm, IccEstimate};
use crate::table::DataTable;
use crate::types::{AnalysisConfig, FixedEffect, LmmOptions};

/// Pipeline stage that produced a per-product issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Intra-class correlation (null model) fitting
    Icc,
    /// Full mixed-model fitting
    Lmm,
}

/// Receiver for progress updates and per-product diagnostics.
///
/// The engine reports through this trait instead of logging so that hosts
/// (CLI, tests) decide how to present warnings; nothing is swallowed.
pub trait AnalysisObserver {
    /// Called after each product finishes, with completed count and total
    fn on_progress(&mut self, _completed: usize, _total: usize) {}

    /// Called when a recoverable per-product fit failure occurs
    fn on_product_issue(&mut self, _product: &str, _stage: AnalysisStage, _error: &StatsError) {}
}

/// Observer that ignores all notifications
pub struct NullObserver;

impl AnalysisObserver for NullObserver {}

/// Correlation of one metric against a product
#[derive(Debug, Clone)]
pub struct MetricCorrelation {
    /// Metric column name
    pub metric: String,
    /// Pearson coefficient; `None` when undefined
    pub r: Option<f64>,
    /// Number of pairwise-complete rows
    pub n: usize,
}

/// Fixed effect of one metric in the full model
#[derive(Debug, Clone)]
pub struct MetricEffect {
    /// Metric column name
    pub metric: String,
    /// Wald inference for the coefficient
    pub effect: FixedEffect,
}

/// Everything computed for a single product column
#[derive(Debug, Clone)]
pub struct ProductAnalysis {
    /// Product column name
    pub product: String,
    /// Per-metric correlations, in configured metric order
    pub correlations: Vec<MetricCorrelation>,
    /// ICC estimate; absent when the null fit failed
    pub icc: Option<IccEstimate>,
    /// Per-metric fixed effects; absent when the full fit failed
    pub lmm: Option<Vec<MetricEffect>>,
}

impl ProductAnalysis {
    /// Whether both model stages produced results
    pub fn is_complete(&self) -> bool {
        self.icc.is_some() && self.lmm.is_some()
    }
}

/// Ordered per-product results of one analysis run
#[derive(Debug, Clone)]
pub struct BatchAnalysis {
    /// One entry per configured product, in configuration order
    pub results: Vec<ProductAnalysis>,
}

impl BatchAnalysis {
    /// Number of products analyzed
    pub fn n_products(&self) -> usize {
        self.results.len()
    }

    /// Number of products with both ICC and LMM results
    pub fn n_complete(&self) -> usize {
        self.results.iter().filter(|r| r.is_complete()).count()
    }
}

/// Run the full analysis batch.
///
/// # Arguments
/// * `table` - Input data
/// * `config` - Column selection; validated before any computation
/// * `options` - Mixed-model fitting options
/// * `observer` - Progress/diagnostic receiver
///
/// # Returns
/// * `BatchAnalysis` with one entry per product, in configuration order
pub fn analyze(
    table: &DataTable,
    config: &AnalysisConfig,
    options: &LmmOptions,
    observer: &mut dyn AnalysisObserver,
) -> StatsResult<BatchAnalysis> {
    config.validate(table)?;
    if !(options.confidence_level > 0.0 && options.confidence_level < 1.0) {
        return Err(StatsError::InvalidConfidenceLevel(options.confidence_level));
    }

    let group_labels = table.label_column(&config.group_column)?;
    let metrics: Vec<(String, Vec<f64>)> = config
        .metric_columns
        .iter()
        .map(|name| Ok((name.clone(), table.numeric_column(name)?)))
        .collect::<StatsResult<_>>()?;

    let total = config.product_columns.len();
    let mut results = Vec::with_capacity(total);

    for (index, product) in config.product_columns.iter().enumerate() {
        let y = table.numeric_column(product)?;

        // Pairwise-complete correlations against each metric
        let correlations: Vec<MetricCorrelation> = metrics
            .iter()
            .map(|(name, values)| {
                let (r, n) = pearson(values, &y);
                MetricCorrelation {
                    metric: name.clone(),
                    r,
                    n,
                }
            })
            .collect();

        // Null model on rows with a response and a group label
        let mut y_null = Vec::new();
        let mut groups_null = Vec::new();
        for (i, label) in group_labels.iter().enumerate() {
            if let Some(label) = label {
                if y[i].is_finite() {
                    y_null.push(y[i]);
                    groups_null.push(label.clone());
                }
            }
        }
        let icc = match estimate_icc(&y_null, &groups_null, options) {
            Ok(est) => Some(est),
            Err(err) => {
                observer.on_product_issue(product, AnalysisStage::Icc, &err);
                None
            }
        };

        // Full model on rows complete in response, all metrics, and group
        let mut y_full = Vec::new();
        let mut groups_full = Vec::new();
        let mut x_full: Vec<Vec<f64>> = vec![Vec::new(); metrics.len()];
        for (i, label) in group_labels.iter().enumerate() {
            let Some(label) = label else { continue };
            if !y[i].is_finite() {
                continue;
            }
            if metrics.iter().any(|(_, values)| !values[i].is_finite()) {
                continue;
            }
            y_full.push(y[i]);
            groups_full.push(label.clone());
            for (j, (_, values)) in metrics.iter().enumerate() {
                x_full[j].push(values[i]);
            }
        }
        let lmm = match fit_lmm(&y_full, &x_full, &groups_full, options) {
            Ok(fit) => Some(
                // Intercept row is fitted but excluded from reporting
                metrics
                    .iter()
                    .zip(fit.effects.iter())
                    .map(|((name, _), effect)| MetricEffect {
                        metric: name.clone(),
                        effect: effect.clone(),
                    })
                    .collect(),
            ),
            Err(err) => {
                observer.on_product_issue(product, AnalysisStage::Lmm, &err);
                None
            }
        };

        results.push(ProductAnalysis {
            product: product.clone(),
            correlations,
            icc,
            lmm,
        });
        observer.on_progress(index + 1, total);
    }

    Ok(BatchAnalysis { results })
}
