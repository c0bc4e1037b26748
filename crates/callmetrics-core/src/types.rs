use crate::errors::{StatsError, StatsResult};
use crate::table::DataTable;

/// Column selection for one analysis run.
///
/// Built once from user selections and immutable for the duration of the
/// run. `metric_columns` is nominally six behavioral metrics, but any
/// non-empty list is accepted.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Grouping column (store identifier)
    pub group_column: String,
    /// Behavioral metric columns, in report order
    pub metric_columns: Vec<String>,
    /// Product performance columns to analyze, in report order
    pub product_columns: Vec<String>,
}

impl AnalysisConfig {
    /// Check that every referenced column exists and no selection is empty.
    ///
    /// Violations are fatal to the run and are reported before any
    /// computation starts.
    pub fn validate(&self, table: &DataTable) -> StatsResult<()> {
        if self.metric_columns.is_empty() {
            return Err(StatsError::EmptyInput {
                field: "metric_columns",
            });
        }
        if self.product_columns.is_empty() {
            return Err(StatsError::EmptyInput {
                field: "product_columns",
            });
        }
        for name in std::iter::once(&self.group_column)
            .chain(self.metric_columns.iter())
            .chain(self.product_columns.iter())
        {
            if !table.has_column(name) {
                return Err(StatsError::MissingColumn(name.clone()));
            }
        }
        Ok(())
    }
}

/// Options for random-intercept LMM fitting
#[derive(Debug, Clone)]
pub struct LmmOptions {
    /// Confidence level for fixed-effect intervals (default: 0.95)
    pub confidence_level: f64,
    /// Maximum iterations for the variance-ratio search
    pub max_iterations: u32,
    /// Convergence tolerance for the variance-ratio search (on log lambda)
    pub tolerance: f64,
}

impl Default for LmmOptions {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            max_iterations: 200,
            tolerance: 1e-8,
        }
    }
}

/// One fixed-effect row: Wald inference at the configured confidence level
#[derive(Debug, Clone)]
pub struct FixedEffect {
    /// Coefficient estimate
    pub estimate: f64,
    /// Standard error of the estimate
    pub std_error: f64,
    /// z-statistic (estimate / std_error)
    pub z_value: f64,
    /// Two-sided p-value from the standard normal
    pub p_value: f64,
    /// Confidence interval lower bound
    pub ci_lower: f64,
    /// Confidence interval upper bound
    pub ci_upper: f64,
}

/// Result of fitting a random-intercept mixed model
#[derive(Debug, Clone)]
pub struct LmmFit {
    /// Intercept fixed effect
    pub intercept: FixedEffect,
    /// Fixed effects for the feature columns, in input order
    pub effects: Vec<FixedEffect>,
    /// Between-group (random intercept) variance component
    pub between_variance: f64,
    /// Within-group (residual) variance component
    pub within_variance: f64,
    /// Estimated ratio between_variance / within_variance
    pub variance_ratio: f64,
    /// Maximized log-likelihood
    pub log_likelihood: f64,
    /// Number of observations used after filtering
    pub n_observations: usize,
    /// Number of distinct groups
    pub n_groups: usize,
    /// Number of features (excluding intercept)
    pub n_features: usize,
}
