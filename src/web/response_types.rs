//! # Web API Response Types
//!
//! JSON shapes returned by the cluster endpoints. Values of sensitive outputs
//! are replaced before they leave the process; the stored record keeps them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::constants::SENSITIVE_PLACEHOLDER;
use crate::models::{Cluster, ClusterOutput};
use crate::state_machine::ClusterStatus;

#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub output_type: Value,
    pub value: Value,
    pub sensitive: bool,
}

impl From<&ClusterOutput> for OutputResponse {
    fn from(output: &ClusterOutput) -> Self {
        let value = if output.sensitive {
            Value::String(SENSITIVE_PLACEHOLDER.to_string())
        } else {
            output.value.clone()
        };
        Self {
            name: output.name.clone(),
            output_type: output.output_type.clone(),
            value,
            sensitive: output.sensitive,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
    pub message: Option<String>,
    pub outputs: Vec<OutputResponse>,
    /// Whether an engine state snapshot is stored
    pub has_state: bool,
    pub destroy_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Cluster> for ClusterResponse {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id.clone(),
            name: cluster.name.clone(),
            status: cluster.status,
            message: cluster.message.clone(),
            outputs: cluster.outputs.iter().map(OutputResponse::from).collect(),
            has_state: cluster.state.is_some(),
            destroy_attempts: cluster.destroy_attempts,
            created_at: cluster.created_at,
            updated_at: cluster.updated_at,
            expires_at: cluster.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClusterListResponse {
    pub total_count: usize,
    pub clusters: Vec<ClusterResponse>,
}

impl From<&[Cluster]> for ClusterListResponse {
    fn from(clusters: &[Cluster]) -> Self {
        Self {
            total_count: clusters.len(),
            clusters: clusters.iter().map(ClusterResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub engine_version: Option<String>,
    pub timestamp: String,
}
