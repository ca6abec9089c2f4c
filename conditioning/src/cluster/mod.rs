pub mod kmeans;
pub mod labeler;

pub use kmeans::{KMeansConfig, KMeansFit, kmeans};
pub use labeler::{ClusterAssignment, compute_clusters, elbow_k};
