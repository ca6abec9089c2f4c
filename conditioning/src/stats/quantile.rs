use crate::error::{PrepError, Result};

/// Finite values of a slice, sorted ascending
pub fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Percentile of already sorted data with linear interpolation between
/// order statistics (rank `p/100 * (n - 1)`)
///
/// `p` is clamped to [0, 100]. Returns NaN for empty input.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    match n {
        0 => f64::NAN,
        1 => sorted[0],
        _ => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Percentile of the finite values of `data`
///
/// # Errors
/// `StatsError` if `data` has no finite values
pub fn percentile(data: &[f64], p: f64) -> Result<f64> {
    let sorted = sorted_finite(data);
    if sorted.is_empty() {
        return Err(PrepError::StatsError(
            "Percentile of data with no finite values".to_string(),
        ));
    }
    Ok(percentile_sorted(&sorted, p))
}

/// Several percentiles of the same data, sorting only once
pub fn percentiles(data: &[f64], ps: &[f64]) -> Result<Vec<f64>> {
    let sorted = sorted_finite(data);
    if sorted.is_empty() {
        return Err(PrepError::StatsError(
            "Percentile of data with no finite values".to_string(),
        ));
    }
    Ok(ps.iter().map(|&p| percentile_sorted(&sorted, p)).collect())
}
