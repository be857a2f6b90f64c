//! Least-squares trend over evenly spaced samples

/// Minimum samples required for a trend
pub const MIN_TREND_SAMPLES: usize = 3;

/// Slope of `values` against their index 0..n-1.
///
/// Returns 0 for fewer than [`MIN_TREND_SAMPLES`] values or a degenerate fit.
pub fn index_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < MIN_TREND_SAMPLES {
        return 0.0;
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }

    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    numerator / denominator
}
