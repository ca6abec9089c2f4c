use crate::cluster::kmeans::{KMeansConfig, kmeans};
use crate::config::ConditioningConfig;
use crate::error::Result;
use crate::stats::{min_positive, percentile_sorted, percentiles, sorted_finite};
use lame_table::{AttributeKey, AttributeTable, FieldType};
use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Per-row cluster labels used to condition columns locally
///
/// `None` marks a row whose predictors were not all finite when the labels
/// were computed. Every other label lies in `0..k`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub labels: Vec<Option<usize>>,
    pub k: usize,
    /// Elbow curve; entry `i` is the inertia for `k = i + 1`
    pub inertia: Vec<f64>,
    /// Columns the labels were computed from
    pub predictors: Vec<String>,
}

impl ClusterAssignment {
    /// Every row in cluster 0
    pub fn single(n_rows: usize) -> Self {
        Self {
            labels: vec![Some(0); n_rows],
            k: 1,
            inertia: Vec::new(),
            predictors: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    /// Row indices carrying `cluster`
    pub fn rows_in(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| (*l == Some(cluster)).then_some(i))
            .collect()
    }

    pub fn n_invalid(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }
}

/// Floor, clip and log applied to each predictor before k-means
///
/// The bounds are learned on the central bulk and reused unchanged for the
/// final fit on every valid row.
struct FeatureMap {
    floors: Vec<f64>,
    lows: Vec<f64>,
    highs: Vec<f64>,
}

impl FeatureMap {
    fn learn(columns: &[Vec<f64>], rows: &[usize], config: &ConditioningConfig) -> Result<Self> {
        let (clip_lo, clip_hi) = config.log_clip_percentiles;
        let mut floors = Vec::with_capacity(columns.len());
        let mut lows = Vec::with_capacity(columns.len());
        let mut highs = Vec::with_capacity(columns.len());
        for column in columns {
            let bulk: Vec<f64> = rows.iter().map(|&r| column[r]).collect();
            let floor = min_positive(&bulk).map_or(config.predictor_floor, |m| {
                m.max(config.predictor_floor)
            });
            let floored: Vec<f64> = bulk.iter().map(|&v| v.max(floor)).collect();
            let bounds = percentiles(&floored, &[clip_lo, clip_hi])?;
            floors.push(floor);
            lows.push(bounds[0]);
            highs.push(bounds[1]);
        }
        Ok(Self { floors, lows, highs })
    }

    fn apply(&self, columns: &[Vec<f64>], rows: &[usize]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), columns.len()), |(i, j)| {
            columns[j][rows[i]]
                .max(self.floors[j])
                .clamp(self.lows[j], self.highs[j])
                .ln()
        })
    }
}

/// Choose k at the peak of the second difference of the inertia curve
///
/// Entry `i` of the second difference sits at `k = i + 2`. Curves with fewer
/// than three points have no second difference and give `k = 1`.
pub fn elbow_k(inertia: &[f64]) -> usize {
    if inertia.len() < 3 {
        return 1;
    }
    inertia
        .windows(3)
        .map(|w| w[0] - 2.0 * w[1] + w[2])
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best })
        .0
        + 2
}

/// Assign every row of `table` to a cluster
///
/// Predictors are the used analyte columns. Rows with any non-finite predictor
/// get `None`. The cluster count is chosen by the elbow heuristic on the
/// central bulk of the data, then k-means is fitted on all valid rows.
pub fn compute_clusters(
    table: &AttributeTable,
    config: &ConditioningConfig,
) -> Result<ClusterAssignment> {
    let n_rows = table.n_rows();
    let predictors = table.match_attributes(&[
        (AttributeKey::DataType, FieldType::Analyte.into()),
        (AttributeKey::Use, true.into()),
    ]);
    if predictors.is_empty() {
        info!("No used analyte columns, assigning every row to a single cluster");
        return Ok(ClusterAssignment::single(n_rows));
    }

    let columns = predictors
        .iter()
        .map(|p| table.values(p))
        .collect::<lame_table::Result<Vec<_>>>()?;

    let valid: Vec<usize> = (0..n_rows)
        .filter(|&r| columns.iter().all(|c| c[r].is_finite()))
        .collect();
    if valid.is_empty() {
        warn!("No row has finite values for every predictor; all rows left unlabelled");
        return Ok(ClusterAssignment {
            labels: vec![None; n_rows],
            k: 1,
            inertia: Vec::new(),
            predictors,
        });
    }

    let bulk = central_bulk(&columns, &valid, config.bulk_percentiles);
    let bulk = if bulk.is_empty() { valid.clone() } else { bulk };
    let features = FeatureMap::learn(&columns, &bulk, config)?;
    let bulk_matrix = features.apply(&columns, &bulk);

    let max_k = config.max_clusters.min(bulk.len());
    let inertia = (1..=max_k)
        .into_par_iter()
        .map(|k| {
            kmeans(&bulk_matrix, &kmeans_config(k, config)).map(|fit| fit.inertia)
        })
        .collect::<Result<Vec<f64>>>()?;

    let mut k = elbow_k(&inertia);
    debug!(
        "Elbow over {} bulk rows ({} predictors): inertia {:?}, k = {}",
        bulk.len(),
        predictors.len(),
        inertia,
        k
    );
    if valid.len() < 2 * k {
        warn!(
            "Only {} valid rows for {} clusters, falling back to a single cluster",
            valid.len(),
            k
        );
        k = 1;
    }

    let mut labels = vec![None; n_rows];
    if k == 1 {
        for &r in &valid {
            labels[r] = Some(0);
        }
    } else {
        let fit = kmeans(&features.apply(&columns, &valid), &kmeans_config(k, config))?;
        for (&r, &label) in valid.iter().zip(&fit.labels) {
            labels[r] = Some(label);
        }
    }

    info!(
        "Clustered {} rows into {} clusters ({} unlabelled)",
        n_rows,
        k,
        n_rows - valid.len()
    );
    Ok(ClusterAssignment {
        labels,
        k,
        inertia,
        predictors,
    })
}

fn kmeans_config(k: usize, config: &ConditioningConfig) -> KMeansConfig {
    KMeansConfig {
        k,
        max_iter: config.kmeans_max_iter,
        tolerance: config.kmeans_tolerance,
        n_init: config.kmeans_n_init,
        seed: config.seed,
    }
}

/// Valid rows whose every predictor lies inside that predictor's percentile interval
fn central_bulk(columns: &[Vec<f64>], valid: &[usize], (lo, hi): (f64, f64)) -> Vec<usize> {
    let bounds: Vec<(f64, f64)> = columns
        .iter()
        .map(|column| {
            let values: Vec<f64> = valid.iter().map(|&r| column[r]).collect();
            let sorted = sorted_finite(&values);
            (percentile_sorted(&sorted, lo), percentile_sorted(&sorted, hi))
        })
        .collect();
    valid
        .iter()
        .copied()
        .filter(|&r| {
            columns
                .iter()
                .zip(&bounds)
                .all(|(column, &(l, h))| column[r] >= l && column[r] <= h)
        })
        .collect()
}
