//! Configuration Loader
//!
//! Layers an optional YAML file and `PROVISIONER_*` environment variables over
//! the built-in defaults, then validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::ProvisionerConfig;
use crate::constants::defaults;
use config::{Config, Environment, File, FileFormat, Map};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded and validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: ProvisionerConfig,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_environment(path, None)
    }

    /// Load configuration with an explicit environment map instead of the
    /// process environment. Useful for tests that must not touch global state.
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: Option<Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::file_not_found(
                    path.display().to_string(),
                ));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix(defaults::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(environment),
        );

        let config: ProvisionerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        let manager = ConfigManager {
            config,
            source_file: path.map(Path::to_path_buf),
        };

        info!(
            config = %manager.sanitized(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(manager))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: ProvisionerConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source_file: None,
        }))
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// JSON rendering of the configuration with secrets masked
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or_default();
        if let Some(credentials) = value
            .get_mut("engine")
            .and_then(|engine| engine.get_mut("credentials"))
        {
            if !credentials.is_null() {
                *credentials = serde_json::Value::String("***REDACTED***".to_string());
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("provisioner.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
server:
  port: 9191
reaper:
  interval: "5m"
engine:
  binary: "/opt/bin/terraform"
"#,
        );

        let manager =
            ConfigManager::load_with_environment(Some(&path), Some(Map::new())).unwrap();
        let config = manager.config();

        assert_eq!(config.server.port, 9191);
        assert_eq!(config.reap_interval().unwrap(), Duration::from_secs(300));
        assert_eq!(config.engine.binary, "/opt/bin/terraform");
        // Unset sections keep their defaults
        assert_eq!(config.cluster.ttl, "24h");
        assert_eq!(manager.source_file(), Some(path.as_path()));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "reaper:\n  interval: \"5m\"\n");

        let mut env = Map::new();
        env.insert("PROVISIONER_REAPER__INTERVAL".to_string(), "90s".to_string());
        env.insert("PROVISIONER_SERVER__PORT".to_string(), "7070".to_string());

        let manager = ConfigManager::load_with_environment(Some(&path), Some(env)).unwrap();

        assert_eq!(
            manager.config().reap_interval().unwrap(),
            Duration::from_secs(90)
        );
        assert_eq!(manager.config().server.port, 7070);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = ConfigManager::load_with_environment(
            Some(Path::new("/definitely/not/here.yaml")),
            Some(Map::new()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_interval_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "reaper:\n  interval: \"soon\"\n");

        let result = ConfigManager::load_with_environment(Some(&path), Some(Map::new()));
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_credentials_are_masked() {
        let mut config = ProvisionerConfig::default();
        config.engine.credentials = Some("super-secret".to_string());
        let manager = ConfigManager::from_config(config).unwrap();

        let rendered = manager.sanitized().to_string();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
