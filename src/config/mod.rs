//! # Provisioner Configuration
//!
//! Typed configuration consumed by the lifecycle service, the expiry sweeper,
//! the process orchestrator and the HTTP server.
//!
//! ## Architecture
//!
//! - **Layered loading**: defaults, then an optional YAML file, then
//!   `PROVISIONER_<SECTION>__<KEY>` environment variables (see [`loader`])
//! - **Explicit validation**: every duration string is parsed once at startup;
//!   an unparsable or zero value is a fatal [`ConfigurationError`]
//! - **Validated accessors**: components receive `Duration`s, never raw strings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provisioner_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(Some("config/provisioner.yaml".as_ref()))?;
//! let interval = manager.config().reap_interval()?;
//! println!("sweeping every {}s", interval.as_secs());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/provisioner.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Database connection and pooling configuration
    pub database: DatabaseConfig,

    /// Expiry sweeper settings
    pub reaper: ReaperConfig,

    /// Cluster lifetime settings
    pub cluster: ClusterConfig,

    /// External provisioning engine settings
    pub engine: EngineConfig,

    /// Log level and format
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
            port: defaults::SERVER_PORT,
        }
    }
}

impl ServerConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Sweep interval as a humantime string (`15m`, `1h 30m`)
    pub interval: String,
    /// Destroy attempts before an expired cluster is abandoned and purged
    pub max_destroy_attempts: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: defaults::REAP_INTERVAL.to_string(),
            max_destroy_attempts: defaults::MAX_DESTROY_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Time-to-live applied to every new cluster
    pub ttl: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ttl: defaults::CLUSTER_TTL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable, resolved against `search_path`
    pub binary: String,
    /// Upper bound for each init/plan/apply/destroy invocation
    pub timeout: String,
    /// Parent directory for ephemeral workspaces; system temp dir when unset
    pub workspace_root: Option<PathBuf>,
    /// `PATH` handed to the engine subprocess
    pub search_path: String,
    /// Name of the credential variable forwarded to the engine
    pub credentials_variable: String,
    /// Credential value; never logged
    pub credentials: Option<String>,
    /// Fail an apply with `MissingOutputs` when the state has no outputs section
    pub require_outputs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: defaults::ENGINE_BINARY.to_string(),
            timeout: defaults::ENGINE_TIMEOUT.to_string(),
            workspace_root: None,
            search_path: defaults::ENGINE_SEARCH_PATH.to_string(),
            credentials_variable: defaults::CREDENTIALS_VARIABLE.to_string(),
            credentials: None,
            require_outputs: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Parse a humantime duration and reject zero
pub fn parse_positive_duration(field: &str, value: &str) -> ConfigResult<Duration> {
    let duration = humantime::parse_duration(value.trim())
        .map_err(|e| ConfigurationError::invalid_duration(field, value, e.to_string()))?;

    if duration.is_zero() {
        return Err(ConfigurationError::invalid_duration(
            field,
            value,
            "duration must be positive",
        ));
    }

    Ok(duration)
}

impl ProvisionerConfig {
    /// Validate every field that components rely on at construction time
    pub fn validate(&self) -> ConfigResult<()> {
        self.reap_interval()?;
        self.engine_timeout()?;

        if self.cluster_ttl()? > Duration::from_secs(defaults::MAX_CLUSTER_TTL_SECS) {
            return Err(ConfigurationError::invalid_value(
                "cluster.ttl",
                "must not exceed 100 years",
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigurationError::invalid_value(
                "server.port",
                "port must be non-zero",
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("database.url"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "at least one connection is required",
            ));
        }
        if self.reaper.max_destroy_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "reaper.max_destroy_attempts",
                "at least one destroy attempt is required",
            ));
        }
        if self.engine.binary.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("engine.binary"));
        }

        Ok(())
    }

    pub fn reap_interval(&self) -> ConfigResult<Duration> {
        parse_positive_duration("reaper.interval", &self.reaper.interval)
    }

    pub fn cluster_ttl(&self) -> ConfigResult<Duration> {
        parse_positive_duration("cluster.ttl", &self.cluster.ttl)
    }

    pub fn engine_timeout(&self) -> ConfigResult<Duration> {
        parse_positive_duration("engine.timeout", &self.engine.timeout)
    }
}
