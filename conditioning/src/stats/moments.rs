use crate::error::{PrepError, Result};

/// Mean and population standard deviation
pub fn mean_std(data: &[f64]) -> Result<(f64, f64)> {
    if data.is_empty() {
        return Err(PrepError::StatsError("Empty data".to_string()));
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Ok((mean, variance.sqrt()))
}

/// Smallest and largest finite value, ignoring NaN and infinities
pub fn nan_min_max(data: &[f64]) -> Option<(f64, f64)> {
    lame_table::finite_range(data)
}

/// Smallest finite value strictly above zero
pub fn min_positive(data: &[f64]) -> Option<f64> {
    data.iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .reduce(f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_std_population() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_relative_eq!(mean, 5.0);
        assert_relative_eq!(std, 2.0);
        assert!(mean_std(&[]).is_err());
    }

    #[test]
    fn test_min_positive() {
        assert_eq!(min_positive(&[-5.0, 0.0, 3.0, 1.0, f64::NAN]), Some(1.0));
        assert_eq!(min_positive(&[-5.0, 0.0]), None);
    }

    #[test]
    fn test_nan_min_max() {
        assert_eq!(nan_min_max(&[f64::NAN, -1.0, 4.0]), Some((-1.0, 4.0)));
        assert_eq!(nan_min_max(&[f64::NAN]), None);
    }
}
