pub mod cluster;

// Re-export core models for easy access
pub use cluster::{Cluster, ClusterOutput};
