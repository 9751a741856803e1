use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a cluster record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// Record persisted, apply not yet started
    Requested,
    /// Apply sequence is running
    Provisioning,
    /// Apply finished; state and outputs are populated
    ProvisionSuccess,
    /// Apply failed; `message` carries the reason
    ProvisionFailed,
    /// Destroy sequence is running
    Destroying,
    /// Destroy finished; record awaits physical removal
    Destroyed,
    /// Destroy failed; retried by the sweeper up to the attempt cap
    DestroyFailed,
}

impl ClusterStatus {
    pub const ALL: [ClusterStatus; 7] = [
        Self::Requested,
        Self::Provisioning,
        Self::ProvisionSuccess,
        Self::ProvisionFailed,
        Self::Destroying,
        Self::Destroyed,
        Self::DestroyFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Provisioning => "provisioning",
            Self::ProvisionSuccess => "provision_success",
            Self::ProvisionFailed => "provision_failed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::DestroyFailed => "destroy_failed",
        }
    }

    /// An orchestration round owns the record while in one of these states
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Requested | Self::Provisioning | Self::Destroying)
    }

    /// No automatic transition happens from here without a new request
    pub fn is_terminal(&self) -> bool {
        !self.is_transient()
    }

    /// Once expired, records in these states are handed to the destroy path
    pub fn is_reapable(&self) -> bool {
        matches!(
            self,
            Self::ProvisionSuccess | Self::ProvisionFailed | Self::DestroyFailed
        )
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "provisioning" => Ok(Self::Provisioning),
            "provision_success" => Ok(Self::ProvisionSuccess),
            "provision_failed" => Ok(Self::ProvisionFailed),
            "destroying" => Ok(Self::Destroying),
            "destroyed" => Ok(Self::Destroyed),
            "destroy_failed" => Ok(Self::DestroyFailed),
            _ => Err(format!("Invalid cluster status: {s}")),
        }
    }
}

/// Default status for new clusters
impl Default for ClusterStatus {
    fn default() -> Self {
        Self::Requested
    }
}
