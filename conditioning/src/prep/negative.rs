use crate::error::{PrepError, Result};
use crate::stats::{min_positive, nan_min_max, yeo_johnson};
use lame_table::NegativeMethod;
use tracing::debug;

/// Offset below the minimum that `gradual_shift` maps to zero
pub const GRADUAL_SHIFT_OFFSET: f64 = 1e-4;

/// Parse a negative-handling policy name
///
/// # Errors
/// `UnknownPolicy` for anything but `ignore`, `minimum_positive`,
/// `gradual_shift` or `yeo_johnson`
pub fn parse_negative_method(name: &str) -> Result<NegativeMethod> {
    NegativeMethod::parse(name).map_err(|_| PrepError::UnknownPolicy(name.to_string()))
}

/// Map non-positive values of one column (or one cluster of it) to usable values
///
/// NaN entries are passed through untouched. Empty input gives empty output.
///
/// # Errors
/// `NoPositiveValues` for `minimum_positive` when finite values exist but none is positive
pub fn handle_negatives(values: &[f64], method: NegativeMethod) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    match method {
        NegativeMethod::Ignore => Ok(ignore(values)),
        NegativeMethod::MinimumPositive => minimum_positive(values),
        NegativeMethod::GradualShift => Ok(gradual_shift(values)),
        NegativeMethod::YeoJohnson => {
            let (out, lambda) = yeo_johnson(values);
            debug!("Yeo-Johnson lambda = {:.4}", lambda);
            Ok(out)
        }
    }
}

/// Values <= 0 become NaN
pub fn ignore(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v <= 0.0 { f64::NAN } else { v })
        .collect()
}

/// Negatives become the smallest positive value; zeros are kept
pub fn minimum_positive(values: &[f64]) -> Result<Vec<f64>> {
    if !values.iter().any(|v| v.is_finite()) {
        return Ok(values.to_vec());
    }
    let floor = min_positive(values).ok_or(PrepError::NoPositiveValues)?;
    Ok(values
        .iter()
        .map(|&v| if v < 0.0 { floor } else { v })
        .collect())
}

/// Affine remap sending `min - 1e-4` to 0 and keeping the maximum
///
/// Applies to every value, not only the negatives, and only when the shifted
/// minimum is non-positive. Not idempotent: a second pass moves the minimum
/// again.
pub fn gradual_shift(values: &[f64]) -> Vec<f64> {
    let Some((min, vmax)) = nan_min_max(values) else {
        return values.to_vec();
    };
    let vmin = min - GRADUAL_SHIFT_OFFSET;
    if vmin > 0.0 {
        return values.to_vec();
    }
    let span = vmax - vmin;
    values.iter().map(|&v| vmax * (v - vmin) / span).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ignore() {
        let out = ignore(&[-1.0, 0.0, 2.0, f64::NAN]);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_minimum_positive_keeps_zero() {
        let out = minimum_positive(&[-5.0, 0.0, 1.0, 2.0, 3.0, 1e6, 2e6]).unwrap();
        assert_eq!(out, vec![1.0, 0.0, 1.0, 2.0, 3.0, 1e6, 2e6]);
    }

    #[test]
    fn test_minimum_positive_without_positives() {
        assert!(matches!(
            minimum_positive(&[-1.0, 0.0]),
            Err(PrepError::NoPositiveValues)
        ));
        let out = minimum_positive(&[f64::NAN]).unwrap();
        assert!(out[0].is_nan());
    }

    #[test]
    fn test_gradual_shift() {
        let out = gradual_shift(&[-5.0, 0.0, 10.0]);
        let vmin = -5.0 - GRADUAL_SHIFT_OFFSET;
        assert_relative_eq!(out[0], 10.0 * GRADUAL_SHIFT_OFFSET / (10.0 - vmin));
        assert_relative_eq!(out[1], 10.0 * (0.0 - vmin) / (10.0 - vmin));
        assert_relative_eq!(out[2], 10.0);

        // Positive data well above the offset is untouched
        assert_eq!(gradual_shift(&[1.0, 2.0]), vec![1.0, 2.0]);
    }

    #[test]
    fn test_empty_and_unknown() {
        for method in [
            NegativeMethod::Ignore,
            NegativeMethod::MinimumPositive,
            NegativeMethod::GradualShift,
            NegativeMethod::YeoJohnson,
        ] {
            assert!(handle_negatives(&[], method).unwrap().is_empty());
        }
        assert!(matches!(
            parse_negative_method("clamp"),
            Err(PrepError::UnknownPolicy(_))
        ));
        assert_eq!(
            parse_negative_method("yeo_johnson").unwrap(),
            NegativeMethod::YeoJohnson
        );
    }

    #[test]
    fn test_yeo_johnson_keeps_order() {
        let values = [-3.0, -1.0, 0.0, 2.0, 50.0];
        let out = handle_negatives(&values, NegativeMethod::YeoJohnson).unwrap();
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }
}
