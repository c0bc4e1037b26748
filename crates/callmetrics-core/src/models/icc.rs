//! Intra-class correlation from a null random-intercept model

use crate::errors::{StatsError, StatsResult};
use crate::models::fit_lmm;
use crate::types::LmmOptions;

/// Floor under the total variance below which the ICC is undefined
const TOTAL_VARIANCE_FLOOR: f64 = 1e-12;

/// ICC of a grouped response
#[derive(Debug, Clone)]
pub struct IccEstimate {
    /// Between-group share of total variance, in [0, 1]
    pub icc: f64,
    /// Between-group (random intercept) variance component
    pub between_variance: f64,
    /// Within-group (residual) variance component
    pub within_variance: f64,
    /// Number of observations used after filtering
    pub n_observations: usize,
    /// Number of distinct groups
    pub n_groups: usize,
}

/// Estimate the intra-class correlation of `y` under the given grouping.
///
/// Fits the intercept-only random-intercept model `y ~ 1` and returns
/// `between / (between + within)`. A degenerate total variance is an error
/// (the ICC is undefined), never a NaN or infinity.
pub fn estimate_icc(y: &[f64], groups: &[String], options: &LmmOptions) -> StatsResult<IccEstimate> {
    let fit = fit_lmm(y, &[], groups, options)?;

    let total = fit.between_variance + fit.within_variance;
    if !total.is_finite() || total < TOTAL_VARIANCE_FLOOR {
        return Err(StatsError::DegenerateVariance);
    }

    Ok(IccEstimate {
        icc: (fit.between_variance / total).clamp(0.0, 1.0),
        between_variance: fit.between_variance,
        within_variance: fit.within_variance,
        n_observations: fit.n_observations,
        n_groups: fit.n_groups,
    })
}
