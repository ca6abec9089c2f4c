use crate::error::{PrepError, Result};
use derive_builder::Builder;
use lame_table::NegativeMethod;
use serde::{Deserialize, Serialize};

/// Settings shared by every column of a sample
///
/// Per-column settings (bounds, methods, `auto_scale`) live in the column
/// attributes; this struct holds what applies to the whole dataset.
///
/// # Example
///
/// ```rust
/// use lame_conditioning::ConditioningConfigBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConditioningConfigBuilder::default()
///     .max_clusters(6usize)
///     .seed(7u64)
///     .build()?;
/// config.validate()?;
/// assert_eq!(config.kmeans_max_iter, 300);
/// # Ok(())
/// # }
/// ```
#[derive(Builder, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct ConditioningConfig {
    /// Upper end of the candidate cluster-count range
    pub max_clusters: usize,

    /// Seed for every k-means fit
    pub seed: u64,

    pub kmeans_max_iter: usize,

    /// Stop Lloyd iterations once the summed squared centroid shift drops below this
    pub kmeans_tolerance: f64,

    /// Number of k-means++ restarts; the lowest-inertia fit wins
    pub kmeans_n_init: usize,

    /// Percentiles bounding the central bulk used to choose k
    pub bulk_percentiles: (f64, f64),

    /// Percentiles each predictor is clipped to before the log transform
    pub log_clip_percentiles: (f64, f64),

    /// Smallest value a predictor is floored to before taking logs
    pub predictor_floor: f64,

    /// Treat values as bounded concentrations (strictly positive, capped at `max_value`)
    pub compositional: bool,

    /// Hard ceiling applied after compositional clipping
    pub max_value: f64,

    /// Negative handling written to every eligible column on a full recompute
    pub negative_method: NegativeMethod,

    /// Chauvenet rejection threshold; lower is stricter
    pub chauvenet_threshold: f64,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            max_clusters: 10,
            seed: 42,
            kmeans_max_iter: 300,
            kmeans_tolerance: 1e-4,
            kmeans_n_init: 1,
            bulk_percentiles: (1.25, 98.75),
            log_clip_percentiles: (2.5, 97.5),
            predictor_floor: 0.01,
            compositional: true,
            max_value: 1e6,
            negative_method: NegativeMethod::Ignore,
            chauvenet_threshold: 1.0,
        }
    }
}

impl ConditioningConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_clusters == 0 {
            return Err(PrepError::ConfigError(
                "max_clusters must be at least 1".to_string(),
            ));
        }
        if self.kmeans_n_init == 0 || self.kmeans_max_iter == 0 {
            return Err(PrepError::ConfigError(
                "kmeans_n_init and kmeans_max_iter must be at least 1".to_string(),
            ));
        }
        check_percentile_pair("bulk_percentiles", self.bulk_percentiles)?;
        check_percentile_pair("log_clip_percentiles", self.log_clip_percentiles)?;
        if !(self.predictor_floor > 0.0) {
            return Err(PrepError::ConfigError(format!(
                "predictor_floor must be positive, got {}",
                self.predictor_floor
            )));
        }
        if !(self.max_value > 0.0) {
            return Err(PrepError::ConfigError(format!(
                "max_value must be positive, got {}",
                self.max_value
            )));
        }
        if !(self.chauvenet_threshold >= 0.0) {
            return Err(PrepError::ConfigError(format!(
                "chauvenet_threshold must be >= 0, got {}",
                self.chauvenet_threshold
            )));
        }
        Ok(())
    }
}

/// `0 <= lower < upper <= 100`
pub(crate) fn check_percentile_pair(name: &str, (lower, upper): (f64, f64)) -> Result<()> {
    let in_range = |p: f64| (0.0..=100.0).contains(&p);
    if in_range(lower) && in_range(upper) && lower < upper {
        Ok(())
    } else {
        Err(PrepError::ConfigError(format!(
            "{name} must satisfy 0 <= lower < upper <= 100, got ({lower}, {upper})"
        )))
    }
}
