use crate::error::{Result, TableError};
use once_cell::sync::Lazy;
use regex::Regex;

static RATIO_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<num>\S+) / (?P<den>\S+)$").expect("ratio pattern is a valid regex")
});

/// Numerator and denominator of a ratio column named `"A / B"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RatioSpec {
    pub numerator: String,
    pub denominator: String,
}

impl RatioSpec {
    #[must_use]
    pub fn new(numerator: &str, denominator: &str) -> Self {
        Self {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }

    /// Parse a ratio column name
    ///
    /// # Errors
    /// `InvalidRatioSpec` unless the name is exactly `"<numerator> / <denominator>"`
    pub fn parse(name: &str) -> Result<Self> {
        let caps = RATIO_PATTERN
            .captures(name)
            .ok_or_else(|| TableError::InvalidRatioSpec(name.to_string()))?;
        Ok(Self::new(&caps["num"], &caps["den"]))
    }

    /// Column name of the ratio
    #[must_use]
    pub fn name(&self) -> String {
        format!("{} / {}", self.numerator, self.denominator)
    }

    /// Elementwise quotient; a non-positive or non-finite denominator gives NaN
    #[must_use]
    pub fn compute(numerator: &[f64], denominator: &[f64]) -> Vec<f64> {
        numerator
            .iter()
            .zip(denominator)
            .map(|(&n, &d)| {
                if d.is_finite() && d > 0.0 && n.is_finite() {
                    n / d
                } else {
                    f64::NAN
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ratio_name() {
        let spec = RatioSpec::parse("Sr88 / Ca44").unwrap();
        assert_eq!(spec.numerator, "Sr88");
        assert_eq!(spec.denominator, "Ca44");
        assert_eq!(spec.name(), "Sr88 / Ca44");
    }

    #[test]
    fn test_malformed_ratio_names() {
        for name in ["Sr88/Ca44", "Sr88 /Ca44", "Sr88 / ", " / Ca44", "Sr88 / Ca44 / Mg24", "Sr88"] {
            assert!(
                matches!(RatioSpec::parse(name), Err(TableError::InvalidRatioSpec(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_compute_masks_bad_denominators() {
        let out = RatioSpec::compute(&[2.0, 4.0, 1.0, f64::NAN], &[1.0, 0.0, -2.0, 3.0]);
        assert_eq!(out[0], 2.0);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
    }
}
