//! # Cluster Handlers
//!
//! Create, read and delete endpoints. Creation and deletion return as soon as
//! the record is in its in-progress status; the engine work continues in the
//! background.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use crate::state_machine::ClusterStatus;
use crate::web::errors::ApiResult;
use crate::web::response_types::{ClusterListResponse, ClusterResponse};
use crate::web::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateClusterParams {
    pub name: Option<String>,
}

/// Create a cluster: PUT /cluster?name=<name>
///
/// The body is the raw engine configuration.
pub async fn create_cluster(
    State(state): State<AppState>,
    Query(params): Query<CreateClusterParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ClusterResponse>)> {
    let cluster = state
        .service
        .create_cluster(body.to_vec(), params.name)
        .await?;

    info!(cluster_id = %cluster.id, "Cluster creation accepted");
    Ok((StatusCode::ACCEPTED, Json(ClusterResponse::from(&cluster))))
}

/// Get a cluster: GET /cluster/{id}
pub async fn get_cluster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ClusterResponse>> {
    let cluster = state.service.get_cluster(&id).await?;
    Ok(Json(ClusterResponse::from(&cluster)))
}

/// List clusters, oldest first: GET /clusters
pub async fn list_clusters(State(state): State<AppState>) -> ApiResult<Json<ClusterListResponse>> {
    let clusters = state.service.get_clusters().await?;
    debug!(count = clusters.len(), "Listing clusters");
    Ok(Json(ClusterListResponse::from(clusters.as_slice())))
}

/// Delete a cluster: DELETE /cluster/{id}
///
/// 202 while the destroy runs, 200 when the cluster was already destroyed.
pub async fn delete_cluster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ClusterResponse>)> {
    let cluster = state.service.request_delete(&id).await?;

    let status = if cluster.status == ClusterStatus::Destroyed {
        StatusCode::OK
    } else {
        info!(cluster_id = %cluster.id, "Cluster deletion accepted");
        StatusCode::ACCEPTED
    };
    Ok((status, Json(ClusterResponse::from(&cluster))))
}
