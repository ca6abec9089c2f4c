use crate::error::{PrepError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// K-means settings for a single fit
#[derive(Debug, Clone, Copy)]
pub struct KMeansConfig {
    pub k: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub n_init: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 1,
            max_iter: 300,
            tolerance: 1e-4,
            n_init: 1,
            seed: 42,
        }
    }
}

/// Result of a k-means fit
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// One row per cluster
    pub centroids: Array2<f64>,
    /// Cluster index per input row
    pub labels: Vec<usize>,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
    pub n_iter: usize,
}

/// Lloyd's k-means with k-means++ seeding
///
/// Rows of `data` are observations. The RNG is seeded from `config.seed`, so
/// the same input and config always produce the same fit. With `n_init > 1`
/// the fit with the lowest inertia is kept.
///
/// # Errors
/// - `ConfigError` if `k == 0`
/// - `InsufficientData` if there are fewer rows than clusters
pub fn kmeans(data: &Array2<f64>, config: &KMeansConfig) -> Result<KMeansFit> {
    let n = data.nrows();
    if config.k == 0 {
        return Err(PrepError::ConfigError("k must be at least 1".to_string()));
    }
    if n < config.k {
        return Err(PrepError::InsufficientData {
            min: config.k,
            actual: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<KMeansFit> = None;
    for _ in 0..config.n_init.max(1) {
        let centroids = init_plus_plus(data, config.k, &mut rng);
        let fit = lloyd(data, centroids, config);
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    best.ok_or_else(|| PrepError::StatsError("k-means produced no fit".to_string()))
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index and squared distance of the closest centroid
fn nearest(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(c, centroid)| (c, squared_distance(point, centroid)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++: first centroid uniform, the rest drawn proportional to the
/// squared distance from the nearest centroid chosen so far
fn init_plus_plus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));
    centroids.row_mut(0).assign(&data.row(rng.random_range(0..n)));

    let mut dists: Vec<f64> = data
        .axis_iter(Axis(0))
        .map(|p| squared_distance(p, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = dists.iter().sum();
        let chosen = if total <= f64::EPSILON {
            // All remaining points coincide with a centroid
            rng.random_range(0..n)
        } else {
            let threshold = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            dists
                .iter()
                .position(|d| {
                    cumulative += d;
                    cumulative >= threshold
                })
                .unwrap_or(n - 1)
        };
        centroids.row_mut(c).assign(&data.row(chosen));
        for (d, p) in dists.iter_mut().zip(data.axis_iter(Axis(0))) {
            *d = d.min(squared_distance(p, centroids.row(c)));
        }
    }
    centroids
}

fn lloyd(data: &Array2<f64>, mut centroids: Array2<f64>, config: &KMeansConfig) -> KMeansFit {
    let (n, dim) = data.dim();
    let k = centroids.nrows();
    let mut labels = vec![0usize; n];
    let mut n_iter = 0;

    for iter in 0..config.max_iter {
        n_iter = iter + 1;
        let mut distances = vec![0.0; n];
        for (i, point) in data.axis_iter(Axis(0)).enumerate() {
            let (c, d) = nearest(point, &centroids);
            labels[i] = c;
            distances[i] = d;
        }

        let mut sums = Array2::<f64>::zeros((k, dim));
        let mut counts = vec![0usize; k];
        for (i, point) in data.axis_iter(Axis(0)).enumerate() {
            let mut row = sums.row_mut(labels[i]);
            row += &point;
            counts[labels[i]] += 1;
        }

        let mut updated = centroids.clone();
        for c in 0..k {
            if counts[c] > 0 {
                let mean = &sums.row(c) / counts[c] as f64;
                updated.row_mut(c).assign(&mean);
            } else {
                // Re-seed an empty cluster with the point farthest from its centroid
                let farthest = distances
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map_or(0, |(i, _)| i);
                updated.row_mut(c).assign(&data.row(farthest));
                distances[farthest] = 0.0;
            }
        }

        let shift: f64 = updated
            .axis_iter(Axis(0))
            .zip(centroids.axis_iter(Axis(0)))
            .map(|(a, b)| squared_distance(a, b))
            .sum();
        centroids = updated;
        if shift <= config.tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, point) in data.axis_iter(Axis(0)).enumerate() {
        let (c, d) = nearest(point, &centroids);
        labels[i] = c;
        inertia += d;
    }

    KMeansFit {
        centroids,
        labels,
        inertia,
        n_iter,
    }
}
