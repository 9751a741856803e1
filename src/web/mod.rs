//! # Web API
//!
//! Thin axum surface over the [`LifecycleService`](crate::orchestration::LifecycleService).
//!
//! | Method | Path | Success |
//! |--------|------|---------|
//! | `PUT` | `/cluster[?name=..]` | 202 + record |
//! | `GET` | `/cluster/{id}` | 200 + record |
//! | `GET` | `/clusters` | 200 + `{total_count, clusters}` |
//! | `DELETE` | `/cluster/{id}` | 202 + record (200 if already destroyed) |
//! | `GET` | `/health` | 200 + `{status, database, engine_version}` |

pub mod errors;
pub mod handlers;
pub mod response_types;
pub mod state;

use axum::routing::{get, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/cluster", put(handlers::clusters::create_cluster))
        .route(
            "/cluster/{id}",
            get(handlers::clusters::get_cluster).delete(handlers::clusters::delete_cluster),
        )
        .route("/clusters", get(handlers::clusters::list_clusters))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
