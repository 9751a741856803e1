//! # System Constants
//!
//! Fixed names shared between the process orchestrator, the persistence layer
//! and the configuration defaults.

/// File names materialized inside every ephemeral engine workspace
pub mod workspace {
    /// Configuration payload written by the orchestrator
    pub const CONFIG_FILE: &str = "main.tf.json";
    /// Prior state snapshot, written only when one exists
    pub const STATE_FILE: &str = "terraform.tfstate";
    /// Plan artifact produced by the planning step
    pub const PLAN_FILE: &str = "cluster.tfplan";
    /// Prefix of the ephemeral directory name
    pub const DIR_PREFIX: &str = "cluster-workspace-";
}

/// Environment handed to the engine subprocess. Nothing else is inherited.
pub mod engine_env {
    pub const PATH: &str = "PATH";
    pub const HOME: &str = "HOME";
    /// Disables the engine's upgrade/phone-home checks
    pub const CHECKPOINT_DISABLE: &str = "CHECKPOINT_DISABLE";
    /// Tells the engine it runs unattended
    pub const IN_AUTOMATION: &str = "TF_IN_AUTOMATION";
    pub const INPUT: &str = "TF_INPUT";
}

/// Configuration defaults
pub mod defaults {
    pub const SERVER_PORT: u16 = 8080;
    pub const BIND_ADDRESS: &str = "0.0.0.0";
    pub const DATABASE_URL: &str = "sqlite:provisioner.db";
    pub const DATABASE_MAX_CONNECTIONS: u32 = 5;
    pub const REAP_INTERVAL: &str = "15m";
    pub const MAX_DESTROY_ATTEMPTS: u32 = 5;
    pub const CLUSTER_TTL: &str = "24h";
    /// Longest accepted `cluster.ttl`. Expiry timestamps stay four-digit-year
    /// RFC 3339 text, which the expiry query compares lexicographically.
    pub const MAX_CLUSTER_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;
    pub const ENGINE_BINARY: &str = "terraform";
    pub const ENGINE_TIMEOUT: &str = "30m";
    pub const ENGINE_SEARCH_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
    pub const CREDENTIALS_VARIABLE: &str = "GOOGLE_CREDENTIALS";
    pub const LOG_LEVEL: &str = "info";
    /// Prefix for environment variable overrides (`PROVISIONER_REAPER__INTERVAL`)
    pub const ENV_PREFIX: &str = "PROVISIONER";
}

/// Messages recorded on clusters by the lifecycle service itself
pub mod messages {
    pub const PROVISION_REQUESTED: &str = "Provisioning requested";
    pub const PROVISION_STARTED: &str = "Provisioning in progress";
    pub const DESTROY_STARTED: &str = "Destroy in progress";
    pub const INTERRUPTED_PROVISION: &str =
        "Provisioning was interrupted before its outcome was recorded; state may be incomplete";
    pub const INTERRUPTED_DESTROY: &str =
        "Destroy was interrupted before its outcome was recorded; it will be retried";
}

/// Placeholder used when rendering sensitive output values
pub const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";
