pub mod moments;
pub mod quantile;
pub mod yeo_johnson;

pub use moments::{mean_std, min_positive, nan_min_max};
pub use quantile::{percentile, percentile_sorted, percentiles, sorted_finite};
pub use yeo_johnson::{fit_lambda, yeo_johnson};
