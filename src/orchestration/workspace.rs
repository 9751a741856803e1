//! Ephemeral per-orchestration working directory.
//!
//! Every apply or destroy gets a fresh directory holding the configuration,
//! the prior state (when one exists) and the plan artifact. [`Workspace::close`]
//! removes it and reports a failed removal; if the workspace is dropped
//! without being closed (an early return or a panic) the directory is still
//! removed, best effort.

use std::io;
use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

use crate::constants::workspace::{CONFIG_FILE, DIR_PREFIX, STATE_FILE};
use crate::error::{ProvisionerError, Result};

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh directory under `root`, or under the system temp dir
    pub async fn create(root: Option<&Path>) -> Result<Self> {
        let root = root.map(Path::to_path_buf);
        let dir = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(DIR_PREFIX);
            match root {
                Some(root) => builder.tempdir_in(root),
                None => builder.tempdir(),
            }
        })
        .await
        .map_err(|e| ProvisionerError::EngineError(format!("workspace creation task failed: {e}")))?
        .map_err(|e| ProvisionerError::EngineError(format!("failed to create workspace: {e}")))?;

        debug!(path = %dir.path().display(), "Workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the configuration payload. An empty payload is refused.
    pub async fn write_config(&self, config: &[u8]) -> Result<()> {
        if config.is_empty() {
            return Err(ProvisionerError::MissingConfig);
        }
        tokio::fs::write(self.path().join(CONFIG_FILE), config)
            .await
            .map_err(|e| ProvisionerError::EngineError(format!("failed to write configuration: {e}")))
    }

    /// Write the prior state snapshot if there is one. Returns whether a file
    /// was written.
    pub async fn write_state(&self, state: Option<&[u8]>) -> Result<bool> {
        match state {
            Some(state) if !state.is_empty() => {
                tokio::fs::write(self.path().join(STATE_FILE), state)
                    .await
                    .map_err(|e| ProvisionerError::EngineError(format!("failed to write state: {e}")))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Read the state snapshot left by the engine, if any
    pub async fn read_state(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path().join(STATE_FILE)).await {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProvisionerError::EngineError(format!("failed to read state: {e}"))),
        }
    }

    /// Remove the directory. A directory that is already gone is not an error.
    pub async fn close(self) -> Result<()> {
        let path = self.path().to_path_buf();
        let dir = self.dir;
        let removed = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| {
                ProvisionerError::CleanupFailed(format!("{}: removal task failed: {e}", path.display()))
            })?;

        match removed {
            Ok(()) => {
                debug!(path = %path.display(), "Workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProvisionerError::CleanupFailed(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }
}
