//! Data conditioning for laser-ablation geochemical maps
//!
//! Raw map measurements carry calibration noise (negative and zero
//! concentrations) and isolated spikes. This crate conditions every used
//! analyte and ratio column of an [`AttributeTable`](lame_table::AttributeTable)
//! before display:
//!
//! 1. [`compute_clusters`] groups map pixels with k-means on the used analytes,
//!    choosing the cluster count with an elbow heuristic
//! 2. [`handle_negatives`] maps non-positive values under a selectable policy
//! 3. [`clip_outliers`] clips extreme values per cluster, by default with a
//!    percentile rule informed by gaps between sorted log values
//! 4. [`Sample::prep_data`] runs the above over a dataset, recomputes derived
//!    ratios and refreshes plotting metadata
//!
//! # Quick Start
//!
//! ```rust
//! use lame_conditioning::{ConditioningConfig, PrepScope, Sample};
//! use lame_table::{AttributeKey, AttributeTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let raw = AttributeTable::from_columns(vec![
//!     ("Xc".to_string(), vec![0.0, 1.0, 2.0, 3.0]),
//!     ("Yc".to_string(), vec![0.0, 0.0, 0.0, 0.0]),
//!     ("Si29".to_string(), vec![-2.0, 110.0, 95.0, 1e5]),
//! ])?;
//!
//! let mut sample = Sample::new("demo", raw, ConditioningConfig::default())?;
//! sample.set_attribute(&["Si29"], AttributeKey::Use, true)?;
//! sample.compute_clusters()?;
//!
//! let report = sample.prep_data(&PrepScope::All)?;
//! assert!(report.is_success());
//! assert!(sample.processed().values("Si29")?[0].is_nan());
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod prep;
pub mod sample;
pub mod stats;

pub use cluster::{ClusterAssignment, KMeansConfig, KMeansFit, compute_clusters, elbow_k, kmeans};
pub use config::{ConditioningConfig, ConditioningConfigBuilder};
pub use error::{PrepError, Result};
pub use prep::{
    ClipParams, chauvenet_clip, clip_outliers, handle_negatives, parse_negative_method,
    parse_outlier_method, quantile_and_distance_clip, quantile_clip,
};
pub use sample::{ColumnFailure, PrepReport, PrepScope, Sample};
