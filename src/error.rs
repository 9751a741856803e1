//! Error types for the provisioner.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvisionerError {
    /// Caller-submitted configuration was empty or malformed
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// The orchestrator was invoked without any configuration to write
    #[error("Missing config: no configuration was supplied to the engine")]
    MissingConfig,
    /// Generic subprocess failure that matched no known error marker
    #[error("Engine error: {0}")]
    EngineError(String),
    /// The engine rejected the configuration (syntax or semantic error)
    #[error("Invalid engine config: {0}")]
    InvalidEngineConfig(String),
    /// The engine could not load or refresh the prior state snapshot
    #[error("State refresh error: {0}")]
    StateRefreshError(String),
    /// A successful apply produced no outputs although outputs were required
    #[error("Missing outputs: apply completed without an outputs section")]
    MissingOutputs,
    /// The ephemeral workspace could not be removed
    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Another apply/destroy is already running for this cluster
    #[error("Conflict: orchestration already in progress for cluster {0}")]
    ConflictInProgress(String),
    /// Fatal startup-time configuration problem
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
}

impl ProvisionerError {
    /// Errors produced by the process orchestrator. These are recorded into a
    /// cluster's `message` instead of being returned to a waiting caller.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig
                | Self::EngineError(_)
                | Self::InvalidEngineConfig(_)
                | Self::StateRefreshError(_)
                | Self::MissingOutputs
                | Self::CleanupFailed(_)
        )
    }

    /// Stable machine-readable code used by the HTTP layer and in logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::MissingConfig => "MISSING_CONFIG",
            Self::EngineError(_) => "ENGINE_ERROR",
            Self::InvalidEngineConfig(_) => "INVALID_ENGINE_CONFIG",
            Self::StateRefreshError(_) => "STATE_REFRESH_ERROR",
            Self::MissingOutputs => "MISSING_OUTPUTS",
            Self::CleanupFailed(_) => "CLEANUP_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConflictInProgress(_) => "CONFLICT_IN_PROGRESS",
            Self::ConfigurationError(_) => "CONFIGURATION_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::StateTransitionError(_) => "STATE_TRANSITION_ERROR",
        }
    }
}

impl From<sqlx::Error> for ProvisionerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ProvisionerError::NotFound("row not found".to_string()),
            other => ProvisionerError::DatabaseError(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for ProvisionerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ProvisionerError::ConfigurationError(format!("database migration failed: {err}"))
    }
}

impl From<serde_json::Error> for ProvisionerError {
    fn from(error: serde_json::Error) -> Self {
        ProvisionerError::DatabaseError(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::config::ConfigurationError> for ProvisionerError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        ProvisionerError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProvisionerError>;
