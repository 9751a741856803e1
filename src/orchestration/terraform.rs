//! # Terraform Engine
//!
//! Drives the `terraform` CLI through one `init`, `plan`, `apply` sequence per
//! orchestration, each in a fresh [`Workspace`]:
//!
//! 1. write `main.tf.json` and, when one exists, the prior `terraform.tfstate`
//! 2. `init` and confirm the initialization marker
//! 3. `plan -out=cluster.tfplan` (with `-destroy` for teardown)
//! 4. `apply` the saved plan
//! 5. read back `terraform.tfstate` and its outputs section
//!
//! A failing step stops the sequence; its output is classified by
//! [`error_classifier`](super::error_classifier). The workspace is removed on
//! every path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{ConfigResult, ProvisionerConfig};
use crate::constants::engine_env;
use crate::constants::workspace::PLAN_FILE;
use crate::error::{ProvisionerError, Result};
use crate::orchestration::command_runner::{CommandOutput, CommandRunner};
use crate::orchestration::engine::{
    parse_state_outputs, ApplyOutcome, DestroyOutcome, ProvisioningEngine,
};
use crate::orchestration::error_classifier::{self, EngineStep};
use crate::orchestration::workspace::Workspace;

/// Settings for [`TerraformEngine`], already validated
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub binary: PathBuf,
    pub timeout: Duration,
    pub workspace_root: Option<PathBuf>,
    pub search_path: String,
    pub credentials_variable: String,
    pub credentials: Option<String>,
    pub require_outputs: bool,
}

impl EngineSettings {
    /// Build from the `engine` section. When no credential is configured, the
    /// credential variable is forwarded from this process's environment.
    pub fn from_config(config: &ProvisionerConfig) -> ConfigResult<Self> {
        let engine = &config.engine;
        let credentials = engine
            .credentials
            .clone()
            .or_else(|| std::env::var(&engine.credentials_variable).ok());

        Ok(Self {
            binary: PathBuf::from(engine.binary.trim()),
            timeout: config.engine_timeout()?,
            workspace_root: engine.workspace_root.clone(),
            search_path: engine.search_path.clone(),
            credentials_variable: engine.credentials_variable.clone(),
            credentials,
            require_outputs: engine.require_outputs,
        })
    }
}

/// Which way a run drives the infrastructure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Apply,
    Destroy,
}

impl RunMode {
    fn step(self) -> EngineStep {
        match self {
            Self::Apply => EngineStep::Apply,
            Self::Destroy => EngineStep::Destroy,
        }
    }
}

/// What one successful run produced
struct RunResult {
    state: Option<Vec<u8>>,
    message: String,
}

#[derive(Debug, Clone)]
pub struct TerraformEngine {
    settings: EngineSettings,
}

impl TerraformEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &ProvisionerConfig) -> ConfigResult<Self> {
        Ok(Self::new(EngineSettings::from_config(config)?))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The complete subprocess environment. Nothing else is inherited.
    fn environment(&self, home: &std::path::Path) -> HashMap<String, String> {
        let mut env = HashMap::from([
            (engine_env::PATH.to_string(), self.settings.search_path.clone()),
            (engine_env::HOME.to_string(), home.display().to_string()),
            (engine_env::CHECKPOINT_DISABLE.to_string(), "1".to_string()),
            (engine_env::IN_AUTOMATION.to_string(), "1".to_string()),
            (engine_env::INPUT.to_string(), "0".to_string()),
        ]);
        if let Some(credentials) = &self.settings.credentials {
            env.insert(
                self.settings.credentials_variable.clone(),
                credentials.clone(),
            );
        }
        env
    }

    fn runner(&self, home: &std::path::Path) -> CommandRunner {
        CommandRunner::new(
            self.settings.binary.clone(),
            self.settings.timeout,
            self.environment(home),
        )
    }

    fn check(step: EngineStep, output: CommandOutput) -> Result<String> {
        if output.success() {
            Ok(output.combined)
        } else {
            Err(error_classifier::classify_failure(step, &output.combined))
        }
    }

    async fn run(
        &self,
        mode: RunMode,
        config: &[u8],
        prior_state: Option<&[u8]>,
    ) -> Result<RunResult> {
        if config.is_empty() {
            return Err(ProvisionerError::MissingConfig);
        }

        let workspace = Workspace::create(self.settings.workspace_root.as_deref()).await?;
        let result = self.run_in(&workspace, mode, config, prior_state).await;

        match (result, workspace.close().await) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!(error = %cleanup, "Workspace cleanup failed after engine failure");
                Err(e)
            }
        }
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        mode: RunMode,
        config: &[u8],
        prior_state: Option<&[u8]>,
    ) -> Result<RunResult> {
        let dir = workspace.path();
        let runner = self.runner(dir);

        workspace.write_config(config).await?;
        let has_state = workspace.write_state(prior_state).await?;
        debug!(workspace = %dir.display(), has_state, "Workspace prepared");

        let init = runner
            .run(EngineStep::Init, dir, &["init", "-input=false", "-no-color"])
            .await?;
        let init = Self::check(EngineStep::Init, init)?;
        if !error_classifier::is_initialized(&init) {
            return Err(ProvisionerError::EngineError(format!(
                "init did not report successful initialization: {}",
                error_classifier::error_excerpt(&init)
            )));
        }

        let plan_out = format!("-out={PLAN_FILE}");
        let mut plan_args = vec!["plan", "-input=false", "-no-color", plan_out.as_str()];
        if mode == RunMode::Destroy {
            plan_args.push("-destroy");
        }
        let plan = runner.run(EngineStep::Plan, dir, &plan_args).await?;
        let plan = Self::check(EngineStep::Plan, plan)?;

        let apply = runner
            .run(
                mode.step(),
                dir,
                &["apply", "-input=false", "-no-color", "-auto-approve", PLAN_FILE],
            )
            .await?;
        let apply = Self::check(mode.step(), apply)?;

        let message = if error_classifier::is_up_to_date(&plan) {
            error_classifier::outcome_message(mode.step(), &plan)
        } else {
            error_classifier::outcome_message(mode.step(), &apply)
        };

        Ok(RunResult {
            state: workspace.read_state().await?,
            message,
        })
    }
}

#[async_trait]
impl ProvisioningEngine for TerraformEngine {
    async fn apply(&self, config: &[u8], prior_state: Option<&[u8]>) -> Result<ApplyOutcome> {
        let result = self.run(RunMode::Apply, config, prior_state).await?;

        let state = result.state.ok_or_else(|| {
            ProvisionerError::EngineError("apply completed without writing a state file".to_string())
        })?;
        let outputs = match parse_state_outputs(&state)? {
            Some(outputs) => outputs,
            None if self.settings.require_outputs => return Err(ProvisionerError::MissingOutputs),
            None => Vec::new(),
        };

        info!(outputs = outputs.len(), message = %result.message, "Apply finished");
        Ok(ApplyOutcome {
            state,
            outputs,
            message: result.message,
        })
    }

    async fn destroy(&self, config: &[u8], prior_state: Option<&[u8]>) -> Result<DestroyOutcome> {
        let result = self.run(RunMode::Destroy, config, prior_state).await?;

        info!(message = %result.message, "Destroy finished");
        Ok(DestroyOutcome {
            state: result.state,
            message: result.message,
        })
    }

    async fn version(&self) -> Result<String> {
        let home = std::env::temp_dir();
        let output = self
            .runner(&home)
            .run(EngineStep::Version, &home, &["version"])
            .await?;
        let output = Self::check(EngineStep::Version, output)?;

        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ProvisionerError::EngineError("version produced no output".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EngineSettings {
        EngineSettings {
            binary: PathBuf::from("terraform"),
            timeout: Duration::from_secs(60),
            workspace_root: None,
            search_path: "/opt/terraform/bin".to_string(),
            credentials_variable: "GOOGLE_CREDENTIALS".to_string(),
            credentials: Some("{\"type\":\"service_account\"}".to_string()),
            require_outputs: false,
        }
    }

    #[test]
    fn test_environment_allow_list() {
        let engine = TerraformEngine::new(settings());
        let env = engine.environment(std::path::Path::new("/tmp/ws"));

        assert_eq!(env.len(), 6);
        assert_eq!(env["PATH"], "/opt/terraform/bin");
        assert_eq!(env["HOME"], "/tmp/ws");
        assert_eq!(env["CHECKPOINT_DISABLE"], "1");
        assert_eq!(env["TF_IN_AUTOMATION"], "1");
        assert_eq!(env["TF_INPUT"], "0");
        assert_eq!(env["GOOGLE_CREDENTIALS"], "{\"type\":\"service_account\"}");
    }

    #[test]
    fn test_environment_without_credentials() {
        let engine = TerraformEngine::new(EngineSettings {
            credentials: None,
            ..settings()
        });
        let env = engine.environment(std::path::Path::new("/tmp/ws"));
        assert_eq!(env.len(), 5);
        assert!(!env.contains_key("GOOGLE_CREDENTIALS"));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ProvisionerConfig::default();
        config.engine.binary = " /usr/local/bin/terraform ".to_string();
        config.engine.timeout = "10m".to_string();
        config.engine.credentials = Some("secret".to_string());

        let settings = EngineSettings::from_config(&config).unwrap();
        assert_eq!(settings.binary, PathBuf::from("/usr/local/bin/terraform"));
        assert_eq!(settings.timeout, Duration::from_secs(600));
        assert_eq!(settings.credentials.as_deref(), Some("secret"));

        config.engine.timeout = "soon".to_string();
        assert!(EngineSettings::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_empty_config_never_spawns() {
        let engine = TerraformEngine::new(EngineSettings {
            binary: PathBuf::from("/nonexistent/terraform"),
            ..settings()
        });
        assert_eq!(
            engine.apply(b"", None).await.unwrap_err(),
            ProvisionerError::MissingConfig
        );
    }
}
