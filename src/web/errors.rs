//! # Web API Error Types
//!
//! Maps lifecycle errors onto HTTP responses with `{"error": {"code", "message"}}`
//! bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::ProvisionerError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Conflict: {message}")]
    Conflict { code: &'static str, message: String },

    #[error("Engine failure: {message}")]
    EngineFailure { code: &'static str, message: String },

    #[error("Internal server error")]
    Internal { code: &'static str },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::EngineFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let (error_code, message) = match &self {
            ApiError::NotFound { message } => ("NOT_FOUND", message.as_str()),
            ApiError::BadRequest { code, message }
            | ApiError::Conflict { code, message }
            | ApiError::EngineFailure { code, message } => (*code, message.as_str()),
            ApiError::Internal { code } => (*code, "Internal server error"),
        };

        let error_response = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl From<ProvisionerError> for ApiError {
    fn from(err: ProvisionerError) -> Self {
        let code = err.code();
        match err {
            ProvisionerError::NotFound(message) => ApiError::NotFound { message },
            ProvisionerError::InvalidConfig(message) => ApiError::BadRequest { code, message },
            ProvisionerError::ConflictInProgress(_) | ProvisionerError::StateTransitionError(_) => {
                ApiError::Conflict {
                    code,
                    message: err.to_string(),
                }
            }
            err if err.is_engine_failure() => ApiError::EngineFailure {
                code,
                message: err.to_string(),
            },
            err => {
                error!(error = %err, code, "Request failed");
                ApiError::Internal { code }
            }
        }
    }
}
