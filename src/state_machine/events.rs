use serde::{Deserialize, Serialize};

/// Events that drive cluster status transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClusterEvent {
    /// Start the apply sequence
    Provision,
    /// Apply finished successfully
    ProvisionSucceeded,
    /// Apply failed with the given message
    ProvisionFailed(String),
    /// Start the destroy sequence
    Destroy,
    /// Destroy finished successfully
    DestroySucceeded,
    /// Destroy failed with the given message
    DestroyFailed(String),
}

impl ClusterEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::ProvisionSucceeded => "provision_succeeded",
            Self::ProvisionFailed(_) => "provision_failed",
            Self::Destroy => "destroy",
            Self::DestroySucceeded => "destroy_succeeded",
            Self::DestroyFailed(_) => "destroy_failed",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::ProvisionFailed(msg) | Self::DestroyFailed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fail_provision(error: impl Into<String>) -> Self {
        Self::ProvisionFailed(error.into())
    }

    pub fn fail_destroy(error: impl Into<String>) -> Self {
        Self::DestroyFailed(error.into())
    }
}
