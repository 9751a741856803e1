//! Timeout-bounded engine subprocess execution.
//!
//! The child runs with a cleared environment plus an explicit allow-list, in
//! the workspace directory. The child is killed when the timeout fires or when
//! the calling future is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{ProvisionerError, Result};
use crate::orchestration::error_classifier::EngineStep;

/// Exit status plus stdout followed by stderr
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub combined: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    timeout: Duration,
    env: HashMap<String, String>,
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration, env: HashMap<String, String>) -> Self {
        Self {
            program: program.into(),
            timeout,
            env,
        }
    }

    /// Run one engine step with `args` inside `workdir`.
    ///
    /// Spawn failures and timeouts are `EngineError`s; a non-zero exit is
    /// returned as output for the caller to classify.
    pub async fn run(&self, step: EngineStep, workdir: &Path, args: &[&str]) -> Result<CommandOutput> {
        let started = Instant::now();
        let mut child = tokio::process::Command::new(&self.program)
            .args(args)
            .current_dir(workdir)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProvisionerError::EngineError(format!(
                    "failed to spawn {} for {step}: {e}",
                    self.program.display()
                ))
            })?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let output = tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let status = status.map_err(|e| {
                    ProvisionerError::EngineError(format!("waiting for {step}: {e}"))
                })?;
                let mut combined = String::from_utf8_lossy(&stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&stderr));
                Ok::<_, ProvisionerError>(CommandOutput { status, combined })
            } => result?,
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                return Err(ProvisionerError::EngineError(format!(
                    "{step} timed out after {}",
                    humantime::format_duration(self.timeout)
                )));
            }
        };

        debug!(
            step = %step,
            exit_code = ?output.status.code(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Engine step finished"
        );
        Ok(output)
    }
}
