use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Display normalisation applied to a column when it is handed to a plot
///
/// Norms are applied when reading map data, never when storing it, so the
/// conditioned values in the table stay in their original units.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Norm {
    /// Identity
    #[default]
    Linear,
    /// Base-10 logarithm, non-positive values become NaN
    Log,
    /// Inverse logit `1 / (1 + e^-x)`
    InvLogit,
    /// Symmetric log `sign(x) * log10(1 + |x|)`, defined for every real input
    Symlog,
}

/// Trait for types that can transform values from stored to display scale
pub trait Transformable {
    fn transform(&self, value: f64) -> f64;
    fn inverse_transform(&self, value: f64) -> f64;
}

impl Transformable for Norm {
    fn transform(&self, value: f64) -> f64 {
        match self {
            Norm::Linear => value,
            Norm::Log => {
                if value > 0.0 {
                    value.log10()
                } else {
                    f64::NAN
                }
            }
            Norm::InvLogit => 1.0 / (1.0 + (-value).exp()),
            Norm::Symlog => value.signum() * value.abs().ln_1p() / std::f64::consts::LN_10,
        }
    }

    fn inverse_transform(&self, value: f64) -> f64 {
        match self {
            Norm::Linear => value,
            Norm::Log => 10f64.powf(value),
            Norm::InvLogit => {
                if value <= 0.0 || value >= 1.0 {
                    f64::NAN
                } else {
                    (value / (1.0 - value)).ln()
                }
            }
            Norm::Symlog => value.signum() * (10f64.powf(value.abs()) - 1.0),
        }
    }
}

impl Norm {
    /// Transform a whole column, preserving NaN
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        use rayon::prelude::*;
        if *self == Norm::Linear {
            return values.to_vec();
        }
        values.par_iter().map(|&v| self.transform(v)).collect()
    }
}
