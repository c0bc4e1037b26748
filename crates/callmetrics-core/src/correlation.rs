//! Pearson correlation over pairwise-complete observations

/// Pearson correlation with its supporting sample size.
///
/// Rows where either value is missing (NaN) are skipped. The coefficient is
/// undefined (`None`) when fewer than 3 complete pairs remain or when either
/// side has zero variance; callers must treat that as "undefined", never as
/// NaN.
///
/// # Arguments
/// * `x` - First variable
/// * `y` - Second variable, aligned by position
///
/// # Returns
/// * `(coefficient, n_pairs)` where the coefficient may be undefined
pub fn pearson(x: &[f64], y: &[f64]) -> (Option<f64>, usize) {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .collect();

    let n = pairs.len();
    if n < 3 {
        return (None, n);
    }

    let n_f = n as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n_f;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    // Zero variance on either side: coefficient undefined
    if sxx <= 0.0 || syy <= 0.0 {
        return (None, n);
    }

    let r = sxy / (sxx * syy).sqrt();
    // Guard against rounding drift past the closed interval
    (Some(r.clamp(-1.0, 1.0)), n)
}
