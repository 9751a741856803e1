//! # Health Check Handler

use axum::extract::State;
use axum::Json;
use tracing::warn;

use crate::database::health_check;
use crate::web::response_types::HealthResponse;
use crate::web::state::AppState;

/// Basic health check endpoint: GET /health
///
/// Always 200; `status` is `degraded` when the database or the engine binary
/// is unavailable.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = match health_check(state.service.pool()).await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };

    let engine_version = match state.service.engine_version().await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Engine version check failed");
            None
        }
    };

    let status = if database_ok && engine_version.is_some() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: if database_ok { "ok" } else { "unavailable" }.to_string(),
        engine_version,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
