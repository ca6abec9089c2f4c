pub mod negative;
pub mod outlier;

pub use negative::{handle_negatives, parse_negative_method};
pub use outlier::{
    COMPOSITIONAL_EPSILON, ClipParams, chauvenet_clip, clip_outliers, parse_outlier_method,
    quantile_and_distance_clip, quantile_clip,
};
