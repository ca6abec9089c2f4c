use crate::config::{ConditioningConfig, check_percentile_pair};
use crate::error::{PrepError, Result};
use crate::stats::{mean_std, percentile_sorted, percentiles};
use itertools::{Itertools, MinMaxResult};
use lame_table::{ColumnAttributes, OutlierMethod};
use statrs::distribution::{ContinuousCDF, Normal};

/// Shift that keeps compositional data strictly positive
pub const COMPOSITIONAL_EPSILON: f64 = 1e-10;

/// Thresholds for one column's outlier clipping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipParams {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub diff_lower_bound: f64,
    pub diff_upper_bound: f64,
    pub compositional: bool,
    pub max_value: f64,
    pub chauvenet_threshold: f64,
}

impl Default for ClipParams {
    fn default() -> Self {
        let attrs = ColumnAttributes::default_for(lame_table::FieldType::Analyte);
        Self::from_attributes(&attrs, &ConditioningConfig::default())
    }
}

impl ClipParams {
    /// Bounds from the column, dataset-wide settings from the config
    pub fn from_attributes(attrs: &ColumnAttributes, config: &ConditioningConfig) -> Self {
        Self {
            lower_bound: attrs.lower_bound,
            upper_bound: attrs.upper_bound,
            diff_lower_bound: attrs.diff_lower_bound,
            diff_upper_bound: attrs.diff_upper_bound,
            compositional: config.compositional,
            max_value: config.max_value,
            chauvenet_threshold: config.chauvenet_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_percentile_pair("bounds", (self.lower_bound, self.upper_bound))?;
        check_percentile_pair("diff bounds", (self.diff_lower_bound, self.diff_upper_bound))
    }
}

/// Parse an outlier method name
pub fn parse_outlier_method(name: &str) -> Result<OutlierMethod> {
    OutlierMethod::parse(name).map_err(|_| PrepError::UnknownPolicy(name.to_string()))
}

/// Clip extreme values of one column (or one cluster of it)
///
/// Only finite entries take part; NaN and infinite entries keep their positions
/// and values.
///
/// # Errors
/// - `ConfigError` if the bounds are not `0 <= lower < upper <= 100`
/// - `NotImplemented` for `log_inflection`
pub fn clip_outliers(values: &[f64], method: OutlierMethod, params: &ClipParams) -> Result<Vec<f64>> {
    match method {
        OutlierMethod::None => Ok(values.to_vec()),
        OutlierMethod::Quantile => {
            params.validate()?;
            quantile_clip(values, params.lower_bound, params.upper_bound)
        }
        OutlierMethod::QuantileAndDistance => {
            params.validate()?;
            quantile_and_distance_clip(values, params)
        }
        OutlierMethod::Chauvenet => chauvenet_clip(values, params.chauvenet_threshold),
        OutlierMethod::LogInflection => Err(PrepError::NotImplemented(
            "log_inflection outlier method".to_string(),
        )),
    }
}

/// Positions and values of the finite entries
fn finite_entries(values: &[f64]) -> (Vec<usize>, Vec<f64>) {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i, v))
        .unzip()
}

/// Clamp to the `[lower, upper]` percentiles of the finite values
pub fn quantile_clip(values: &[f64], lower: f64, upper: f64) -> Result<Vec<f64>> {
    check_percentile_pair("bounds", (lower, upper))?;
    let (_, finite) = finite_entries(values);
    if finite.is_empty() {
        return Ok(values.to_vec());
    }
    let bounds = percentiles(&finite, &[lower, upper])?;
    let (lo, hi) = (bounds[0], bounds[1]);
    Ok(values
        .iter()
        .map(|&v| if v.is_finite() { v.clamp(lo, hi) } else { v })
        .collect())
}

/// Percentile clip informed by gaps between sorted log values
///
/// In sorted log space a value starts the upper tail when it is above the
/// `upper_bound` percentile and the gap below it is above the
/// `diff_upper_bound` percentile of all gaps; the whole tail is set to the last
/// value before it. The lower tail mirrors this. When no value sits between
/// the two tails neither is clipped. Replacement values are taken from the
/// data, so the output range never exceeds the input range and sorted order
/// is kept.
/// Compositional data is then capped at `max_value` and floored at epsilon.
pub fn quantile_and_distance_clip(values: &[f64], params: &ClipParams) -> Result<Vec<f64>> {
    let (positions, finite) = finite_entries(values);
    let n = finite.len();
    if n == 0 {
        return Ok(values.to_vec());
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let shift = |v: f64| {
        if params.compositional {
            // v0 = min - eps, log argument v - v0 + eps
            (v - min + 2.0 * COMPOSITIONAL_EPSILON).log10()
        } else {
            (v - min + 1.0).log10()
        }
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| finite[a].total_cmp(&finite[b]));
    let sorted_raw: Vec<f64> = order.iter().map(|&i| finite[i]).collect();
    let sorted_log: Vec<f64> = sorted_raw.iter().map(|&v| shift(v)).collect();

    let ql = percentile_sorted(&sorted_log, params.lower_bound);
    let qu = percentile_sorted(&sorted_log, params.upper_bound);

    let mut gaps = Vec::with_capacity(n);
    gaps.push(0.0);
    gaps.extend(sorted_log.windows(2).map(|w| w[1] - w[0]));
    let mut sorted_gaps = gaps.clone();
    sorted_gaps.sort_by(f64::total_cmp);
    let dql = percentile_sorted(&sorted_gaps, params.diff_lower_bound);
    let dqu = percentile_sorted(&sorted_gaps, params.diff_upper_bound);

    let upper_start = (1..n).find(|&i| sorted_log[i] > qu && gaps[i] > dqu);
    let lower_end = (0..n.saturating_sub(1))
        .rev()
        .find(|&j| sorted_log[j] < ql && gaps[j + 1] > dql);

    // Both tails need at least one untouched value between them, otherwise
    // each plateau would come from the opposite tail
    let (upper_start, lower_end) = match (upper_start, lower_end) {
        (Some(start), Some(end)) if end + 1 >= start => (None, None),
        tails => tails,
    };

    let mut clipped = sorted_raw.clone();
    if let Some(start) = upper_start {
        let plateau = sorted_raw[start - 1];
        clipped[start..].iter_mut().for_each(|v| *v = plateau);
    }
    if let Some(end) = lower_end {
        let plateau = sorted_raw[end + 1];
        clipped[..=end].iter_mut().for_each(|v| *v = plateau);
    }

    let mut out = values.to_vec();
    for (rank, &i) in order.iter().enumerate() {
        let mut v = clipped[rank];
        if params.compositional {
            v = v.min(params.max_value).max(COMPOSITIONAL_EPSILON);
        }
        out[positions[i]] = v;
    }
    Ok(out)
}

/// Chauvenet's criterion
///
/// A value is rejected when its two-sided normal tail probability is below
/// `threshold / (2N)`; rejected values are replaced with the nearest
/// retained extreme.
pub fn chauvenet_clip(values: &[f64], threshold: f64) -> Result<Vec<f64>> {
    if !(threshold >= 0.0) {
        return Err(PrepError::ConfigError(format!(
            "chauvenet threshold must be >= 0, got {threshold}"
        )));
    }
    let (_, finite) = finite_entries(values);
    let n = finite.len();
    if n < 2 {
        return Ok(values.to_vec());
    }
    let (mean, std) = mean_std(&finite)?;
    if std == 0.0 {
        return Ok(values.to_vec());
    }

    let normal = Normal::new(0.0, 1.0).map_err(|e| PrepError::StatsError(e.to_string()))?;
    let criterion = threshold / (2.0 * n as f64);
    let rejected = |v: f64| 2.0 * normal.sf((v - mean).abs() / std) < criterion;

    let retained = finite.iter().copied().filter(|&v| !rejected(v));
    let (lo, hi) = match retained.minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => return Ok(values.to_vec()),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };

    Ok(values
        .iter()
        .map(|&v| {
            if v.is_finite() && rejected(v) {
                if v < mean { lo } else { hi }
            } else {
                v
            }
        })
        .collect())
}
