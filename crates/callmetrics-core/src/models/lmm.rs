//! Random-intercept linear mixed model
//!
//! Fits `y = X beta + u_g + e` with `u_g ~ N(0, tau^2)` per group and
//! `e ~ N(0, sigma^2)`, by maximum likelihood. Beta and sigma^2 are profiled
//! out of the Gaussian likelihood, leaving a one-dimensional search over the
//! variance ratio `lambda = tau^2 / sigma^2`. For a single random intercept
//! the marginal covariance inverts in closed form per group, so each
//! objective evaluation reduces to cross-product accumulators and one
//! Cholesky solve of the GLS normal equations.

use std::collections::HashMap;

use faer::prelude::*;
use faer::{Mat, Side};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::errors::{StatsError, StatsResult};
use crate::types::{FixedEffect, LmmFit, LmmOptions};

/// Floor under residual sums of squares before taking logarithms
const RSS_FLOOR: f64 = 1e-300;

/// Relative floor under the centered sum of squares of the response
const VARIANCE_FLOOR: f64 = 1e-10;

/// Search window for log(lambda)
const LOG_LAMBDA_RANGE: (f64, f64) = (-15.0, 15.0);

const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Per-group cross products of the design matrix and response
struct GroupSums {
    n: f64,
    /// Column sums of the design matrix (length p)
    sx: Vec<f64>,
    /// Sum of the response
    sy: f64,
    /// X'X, row-major (p x p)
    sxx: Vec<f64>,
    /// X'y (length p)
    sxy: Vec<f64>,
    /// y'y
    syy: f64,
}

/// Fit a random-intercept mixed model
///
/// # Arguments
/// * `y` - Response variable (n observations)
/// * `x` - Feature columns (each of n observations); empty for a null model
/// * `groups` - Group label per observation, aligned with `y`
/// * `options` - Fitting options
///
/// # Returns
/// * `LmmFit` with fixed effects (Wald inference) and variance components
pub fn fit_lmm(
    y: &[f64],
    x: &[Vec<f64>],
    groups: &[String],
    options: &LmmOptions,
) -> StatsResult<LmmFit> {
    if y.is_empty() {
        return Err(StatsError::EmptyInput { field: "y" });
    }
    if !(options.confidence_level > 0.0 && options.confidence_level < 1.0) {
        return Err(StatsError::InvalidConfidenceLevel(options.confidence_level));
    }

    let n_obs = y.len();
    if groups.len() != n_obs {
        return Err(StatsError::DimensionMismatch {
            y_len: n_obs,
            x_rows: groups.len(),
        });
    }
    for col in x.iter() {
        if col.len() != n_obs {
            return Err(StatsError::DimensionMismatch {
                y_len: n_obs,
                x_rows: col.len(),
            });
        }
    }

    let n_features = x.len();
    let p = n_features + 1; // leading intercept column

    // Keep rows where the response and every feature are finite
    let valid_indices: Vec<usize> = (0..n_obs)
        .filter(|&i| {
            y[i].is_finite() && x.iter().all(|col| col[i].is_finite())
        })
        .collect();

    if valid_indices.is_empty() {
        return Err(StatsError::NoValidData);
    }
    let n_valid = valid_indices.len();
    if n_valid <= p {
        return Err(StatsError::InsufficientData {
            rows: n_valid,
            cols: n_features,
        });
    }

    // Map group labels to dense indices
    let mut group_index: HashMap<&str, usize> = HashMap::new();
    for &i in &valid_indices {
        let next = group_index.len();
        group_index.entry(groups[i].as_str()).or_insert(next);
    }
    let n_groups = group_index.len();
    if n_groups < 2 {
        return Err(StatsError::InsufficientGroups { groups: n_groups });
    }

    // Accumulate per-group cross products; design row is [1, x_1, ..., x_k]
    let mut sums: Vec<GroupSums> = (0..n_groups)
        .map(|_| GroupSums {
            n: 0.0,
            sx: vec![0.0; p],
            sy: 0.0,
            sxx: vec![0.0; p * p],
            sxy: vec![0.0; p],
            syy: 0.0,
        })
        .collect();

    let mut row = vec![0.0; p];
    let mut sy_total = 0.0;
    let mut syy_total = 0.0;
    for &i in &valid_indices {
        let g = &mut sums[group_index[groups[i].as_str()]];
        row[0] = 1.0;
        for (j, col) in x.iter().enumerate() {
            row[j + 1] = col[i];
        }
        let yi = y[i];
        g.n += 1.0;
        g.sy += yi;
        g.syy += yi * yi;
        sy_total += yi;
        syy_total += yi * yi;
        for a in 0..p {
            g.sx[a] += row[a];
            g.sxy[a] += row[a] * yi;
            for b in 0..p {
                g.sxx[a * p + b] += row[a] * row[b];
            }
        }
    }

    // A response with (near) zero variance has nothing to decompose
    let n_f = n_valid as f64;
    let centered_ss = syy_total - sy_total * sy_total / n_f;
    if centered_ss < VARIANCE_FLOOR * n_f.max(1.0) {
        return Err(StatsError::DegenerateVariance);
    }

    // Golden-section search on the profiled deviance over log(lambda)
    let (mut lo, mut hi) = LOG_LAMBDA_RANGE;
    let mut c = hi - INV_PHI * (hi - lo);
    let mut d = lo + INV_PHI * (hi - lo);
    let mut f_c = profiled_deviance(&sums, p, n_f, c.exp())?.deviance;
    let mut f_d = profiled_deviance(&sums, p, n_f, d.exp())?.deviance;
    let mut iterations: u32 = 0;
    while (hi - lo) > options.tolerance && iterations < options.max_iterations {
        if f_c < f_d {
            hi = d;
            d = c;
            f_d = f_c;
            c = hi - INV_PHI * (hi - lo);
            f_c = profiled_deviance(&sums, p, n_f, c.exp())?.deviance;
        } else {
            lo = c;
            c = d;
            f_c = f_d;
            d = lo + INV_PHI * (hi - lo);
            f_d = profiled_deviance(&sums, p, n_f, d.exp())?.deviance;
        }
        iterations += 1;
    }
    if (hi - lo) > options.tolerance {
        return Err(StatsError::ConvergenceFailure {
            iterations,
            tolerance: options.tolerance,
        });
    }

    // Compare the interior optimum against the lambda = 0 boundary (pure OLS)
    let lambda_interior = (0.5 * (lo + hi)).exp();
    let interior = profiled_deviance(&sums, p, n_f, lambda_interior)?;
    let boundary = profiled_deviance(&sums, p, n_f, 0.0)?;
    let (lambda, best) = if boundary.deviance <= interior.deviance {
        (0.0, boundary)
    } else {
        (lambda_interior, interior)
    };

    let sigma2 = (best.rss / n_f).max(0.0);
    let tau2 = lambda * sigma2;
    let log_likelihood = -0.5
        * (n_f * (2.0 * std::f64::consts::PI).ln()
            + n_f * (best.rss.max(RSS_FLOOR) / n_f).ln()
            + best.log_det_scale
            + n_f);

    // Unscaled covariance of the fixed effects: (X' M X)^{-1}
    let a_mat = Mat::from_fn(p, p, |i, j| best.normal_matrix[i * p + j]);
    let chol = a_mat
        .cholesky(Side::Lower)
        .map_err(|_| StatsError::CholeskyFailed)?;
    let unscaled_cov = chol.solve(&Mat::<f64>::identity(p, p));
    let cov_diag: Vec<f64> = (0..p).map(|j| unscaled_cov[(j, j)].max(0.0)).collect();

    let normal = Normal::new(0.0, 1.0).map_err(|e| StatsError::Numerical(e.to_string()))?;
    let z_crit = normal.inverse_cdf(0.5 + options.confidence_level / 2.0);

    let mut all_effects = Vec::with_capacity(p);
    for j in 0..p {
        let estimate = best.beta[j];
        let std_error = (sigma2 * cov_diag[j]).sqrt();
        let z_value = if std_error > 0.0 {
            estimate / std_error
        } else if estimate == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(estimate)
        };
        let p_value = 2.0 * (1.0 - normal.cdf(z_value.abs()));
        all_effects.push(FixedEffect {
            estimate,
            std_error,
            z_value,
            p_value,
            ci_lower: estimate - z_crit * std_error,
            ci_upper: estimate + z_crit * std_error,
        });
    }
    let effects = all_effects.split_off(1);
    let intercept = all_effects
        .pop()
        .ok_or_else(|| StatsError::Numerical("missing intercept effect".into()))?;

    Ok(LmmFit {
        intercept,
        effects,
        between_variance: tau2,
        within_variance: sigma2,
        variance_ratio: lambda,
        log_likelihood,
        n_observations: n_valid,
        n_groups,
        n_features,
    })
}

/// Outcome of one profiled-deviance evaluation at a fixed lambda
struct ProfiledFit {
    deviance: f64,
    beta: Vec<f64>,
    rss: f64,
    /// X' M X, row-major, at this lambda
    normal_matrix: Vec<f64>,
    /// Sum over groups of ln(1 + n_g * lambda)
    log_det_scale: f64,
}

/// Evaluate the profiled -2 log-likelihood (up to constants) at one lambda.
///
/// With `M = V_0^{-1}` applied per group via Woodbury
/// (`M_g = I - a_g * J`, `a_g = lambda / (1 + n_g * lambda)`), the GLS
/// normal equations are `(X'MX) beta = X'My` and the profiled deviance is
/// `n * ln(rss) + sum_g ln(1 + n_g * lambda)`.
fn profiled_deviance(
    sums: &[GroupSums],
    p: usize,
    n: f64,
    lambda: f64,
) -> StatsResult<ProfiledFit> {
    let mut normal_matrix = vec![0.0; p * p];
    let mut rhs = vec![0.0; p];
    let mut ytmy = 0.0;
    let mut log_det_scale = 0.0;

    for g in sums {
        let shrink = lambda / (1.0 + g.n * lambda);
        log_det_scale += (1.0 + g.n * lambda).ln();
        ytmy += g.syy - shrink * g.sy * g.sy;
        for a in 0..p {
            rhs[a] += g.sxy[a] - shrink * g.sx[a] * g.sy;
            for b in 0..p {
                normal_matrix[a * p + b] += g.sxx[a * p + b] - shrink * g.sx[a] * g.sx[b];
            }
        }
    }

    let a_mat = Mat::from_fn(p, p, |i, j| normal_matrix[i * p + j]);
    let b_mat = Mat::from_fn(p, 1, |i, _| rhs[i]);
    let chol = a_mat
        .cholesky(Side::Lower)
        .map_err(|_| StatsError::CholeskyFailed)?;
    let solution = chol.solve(&b_mat);
    let beta: Vec<f64> = (0..p).map(|i| solution[(i, 0)]).collect();

    // rss = y'My - beta'(X'My), since beta solves the normal equations
    let fitted: f64 = beta.iter().zip(rhs.iter()).map(|(bi, ri)| bi * ri).sum();
    let rss = (ytmy - fitted).max(0.0);
    let deviance = n * rss.max(RSS_FLOOR).ln() + log_det_scale;
    if !deviance.is_finite() {
        return Err(StatsError::Numerical(format!(
            "non-finite deviance at lambda {lambda}"
        )));
    }

    Ok(ProfiledFit {
        deviance,
        beta,
        rss,
        normal_matrix,
        log_det_scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn grouped_labels(n_groups: usize, per_group: usize) -> Vec<String> {
        (0..n_groups)
            .flat_map(|g| std::iter::repeat(format!("store_{g}")).take(per_group))
            .collect()
    }

    #[test]
    fn test_recovers_known_slope() {
        let mut rng = StdRng::seed_from_u64(7);
        let groups = grouped_labels(3, 20);
        let offsets = [-1.5, 0.0, 1.5];
        let x: Vec<f64> = (0..60).map(|_| rng.gen_range(0.0..10.0)).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, xi)| 2.0 * xi + offsets[i / 20] + rng.gen_range(-0.3..0.3))
            .collect();

        let fit = fit_lmm(&y, &[x], &groups, &LmmOptions::default()).unwrap();

        assert_eq!(fit.n_observations, 60);
        assert_eq!(fit.n_groups, 3);
        assert_eq!(fit.effects.len(), 1);
        let slope = &fit.effects[0];
        assert!((slope.estimate - 2.0).abs() < 0.1, "slope {}", slope.estimate);
        assert!(slope.p_value < 1e-6);
        assert!(slope.ci_lower < slope.estimate && slope.estimate < slope.ci_upper);
        // Store offsets are much larger than the residual noise
        assert!(fit.between_variance > fit.within_variance);
    }

    #[test]
    fn test_null_model_variance_split() {
        let mut rng = StdRng::seed_from_u64(11);
        let groups = grouped_labels(4, 15);
        let offsets = [-6.0, -2.0, 2.0, 6.0];
        let y: Vec<f64> = (0..60)
            .map(|i| offsets[i / 15] + rng.gen_range(-0.5..0.5))
            .collect();

        let fit = fit_lmm(&y, &[], &groups, &LmmOptions::default()).unwrap();

        assert_eq!(fit.n_features, 0);
        assert!(fit.effects.is_empty());
        assert!(fit.between_variance > 0.0);
        assert!(fit.within_variance > 0.0);
        assert!(fit.between_variance > 10.0 * fit.within_variance);
    }

    #[test]
    fn test_no_grouping_prefers_boundary() {
        let mut rng = StdRng::seed_from_u64(13);
        let groups = grouped_labels(3, 20);
        let y: Vec<f64> = (0..60).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let fit = fit_lmm(&y, &[], &groups, &LmmOptions::default()).unwrap();

        // Identically distributed groups: nearly all variance is residual
        assert!(fit.between_variance < 0.3 * fit.within_variance);
    }

    #[test]
    fn test_duplicate_feature_is_singular() {
        let mut rng = StdRng::seed_from_u64(17);
        let groups = grouped_labels(3, 10);
        let x: Vec<f64> = (0..30).map(|_| rng.gen_range(0.0..5.0)).collect();
        let y: Vec<f64> = x.iter().map(|xi| 1.0 + xi + 0.01).collect();

        let result = fit_lmm(&y, &[x.clone(), x], &groups, &LmmOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_constant_response_is_degenerate() {
        let groups = grouped_labels(3, 5);
        let y = vec![4.2; 15];
        let result = fit_lmm(&y, &[], &groups, &LmmOptions::default());
        assert!(matches!(result, Err(StatsError::DegenerateVariance)));
    }

    #[test]
    fn test_single_group_rejected() {
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let groups = vec!["only".to_string(); 5];
        let result = fit_lmm(&y, &[], &groups, &LmmOptions::default());
        assert!(matches!(result, Err(StatsError::InsufficientGroups { .. })));
    }

    #[test]
    fn test_nan_rows_filtered() {
        let mut rng = StdRng::seed_from_u64(19);
        let groups = grouped_labels(2, 10);
        let mut y: Vec<f64> = (0..20)
            .map(|i| if i < 10 { -3.0 } else { 3.0 } + rng.gen_range(-0.5..0.5))
            .collect();
        y[3] = f64::NAN;
        y[12] = f64::NAN;

        let fit = fit_lmm(&y, &[], &groups, &LmmOptions::default()).unwrap();
        assert_eq!(fit.n_observations, 18);
    }

    #[test]
    fn test_dimension_mismatch() {
        let y = vec![1.0, 2.0, 3.0];
        let groups = vec!["a".to_string(), "b".to_string()];
        let result = fit_lmm(&y, &[], &groups, &LmmOptions::default());
        assert!(matches!(result, Err(StatsError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insufficient_rows() {
        let y = vec![1.0, 2.0];
        let groups = vec!["a".to_string(), "b".to_string()];
        let x = vec![vec![0.5, 0.7]];
        let result = fit_lmm(&y, &x, &groups, &LmmOptions::default());
        assert!(matches!(result, Err(StatsError::InsufficientData { .. })));
    }

    #[test]
    fn test_invalid_confidence_level() {
        let y = vec![1.0, 2.0, 3.0, 4.0];
        let groups = grouped_labels(2, 2);
        let options = LmmOptions {
            confidence_level: 1.5,
            ..Default::default()
        };
        let result = fit_lmm(&y, &[], &groups, &options);
        assert!(matches!(
            result,
            Err(StatsError::InvalidConfidenceLevel(_))
        ));
    }
}
