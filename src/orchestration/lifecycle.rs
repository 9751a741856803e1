//! # Lifecycle Service
//!
//! Coordinates cluster records with the provisioning engine.
//!
//! ## Overview
//!
//! Every status change is applied through
//! [`ClusterStateMachine`](crate::state_machine::ClusterStateMachine) and
//! persisted inside a transaction owned by one operation. The engine itself is
//! never called while a transaction is open: a round of work is
//!
//! 1. claim the cluster id in the [`InFlightRegistry`]
//! 2. move the record into its in-progress status and commit
//! 3. run the engine (panics are caught and become `EngineError`)
//! 4. record the terminal status, and on success the new state, in a fresh
//!    transaction
//!
//! Creation returns once the `requested` record is committed and provisions in
//! the background; [`LifecycleService::delete_cluster`] waits for the destroy
//! while [`LifecycleService::request_delete`] detaches it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use provisioner_core::config::ProvisionerConfig;
//! use provisioner_core::database::create_in_memory_pool;
//! use provisioner_core::orchestration::{LifecycleService, LifecycleSettings, TerraformEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvisionerConfig::default();
//! let pool = create_in_memory_pool().await?;
//! let engine = Arc::new(TerraformEngine::from_config(&config)?);
//! let service = LifecycleService::new(
//!     pool,
//!     engine,
//!     LifecycleSettings::from_config(&config)?,
//!     tracing::Span::current(),
//! );
//!
//! let cluster = service
//!     .create_cluster(br#"{"provider":{"google":{}}}"#.to_vec(), None)
//!     .await?;
//! println!("cluster {} is {}", cluster.id, cluster.status);
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use sqlx::SqlitePool;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::{ConfigResult, ProvisionerConfig};
use crate::constants::messages;
use crate::error::{ProvisionerError, Result};
use crate::models::Cluster;
use crate::orchestration::engine::{ApplyOutcome, DestroyOutcome, ProvisioningEngine};
use crate::orchestration::in_flight::{InFlightRegistry, InFlightToken, OrchestrationKind};
use crate::state_machine::{ClusterEvent, ClusterStateMachine, ClusterStatus};

/// Validated settings for [`LifecycleService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Lifetime of a new cluster before it becomes eligible for reaping
    pub cluster_ttl: Duration,
    /// Destroy attempts after which a `destroy_failed` record is abandoned
    pub max_destroy_attempts: u32,
}

impl LifecycleSettings {
    pub fn from_config(config: &ProvisionerConfig) -> ConfigResult<Self> {
        Ok(Self {
            cluster_ttl: config.cluster_ttl()?,
            max_destroy_attempts: config.reaper.max_destroy_attempts,
        })
    }
}

/// How a destroy request started
enum DestroyStart {
    AlreadyDestroyed(Cluster),
    Started(Cluster, InFlightToken),
}

#[derive(Clone)]
pub struct LifecycleService {
    pool: SqlitePool,
    engine: Arc<dyn ProvisioningEngine>,
    in_flight: InFlightRegistry,
    settings: LifecycleSettings,
    background: TaskTracker,
    span: Span,
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .field("background_tasks", &self.background.len())
            .finish()
    }
}

impl LifecycleService {
    /// Build the service. Operation spans are created as children of `parent`.
    pub fn new(
        pool: SqlitePool,
        engine: Arc<dyn ProvisioningEngine>,
        settings: LifecycleSettings,
        parent: Span,
    ) -> Self {
        Self {
            pool,
            engine,
            in_flight: InFlightRegistry::new(),
            settings,
            background: TaskTracker::new(),
            span: parent,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    pub fn settings(&self) -> LifecycleSettings {
        self.settings
    }

    /// Persist a new `requested` record and start provisioning it in the
    /// background. Returns without waiting for the engine.
    pub async fn create_cluster(&self, config: Vec<u8>, name: Option<String>) -> Result<Cluster> {
        validate_config(&config)?;

        let mut cluster = Cluster::new(config, name, self.settings.cluster_ttl);
        cluster.message = Some(messages::PROVISION_REQUESTED.to_string());

        let token = self
            .in_flight
            .try_claim(&cluster.id, OrchestrationKind::Provision)?;

        let mut tx = self.pool.begin().await?;
        Cluster::insert(&mut *tx, &cluster).await?;
        tx.commit().await?;

        info!(
            parent: &self.span,
            cluster_id = %cluster.id,
            name = %cluster.name,
            expires_at = %cluster.expires_at,
            "Cluster requested"
        );

        let service = self.clone();
        let id = cluster.id.clone();
        self.background
            .spawn(async move { service.provision(id, token).await });

        Ok(cluster)
    }

    pub async fn get_cluster(&self, id: &str) -> Result<Cluster> {
        if id.trim().is_empty() {
            return Err(ProvisionerError::NotFound("cluster id must not be empty".to_string()));
        }
        let mut conn = self.pool.acquire().await?;
        Cluster::find_by_id(&mut *conn, id).await
    }

    /// All records, oldest first
    pub async fn get_clusters(&self) -> Result<Vec<Cluster>> {
        let mut conn = self.pool.acquire().await?;
        Cluster::list_all(&mut *conn).await
    }

    /// Destroy a cluster and wait for the outcome.
    ///
    /// Deleting an already destroyed cluster returns it unchanged. An engine
    /// failure is recorded on the cluster (`destroy_failed`) and returned.
    pub async fn delete_cluster(&self, id: &str) -> Result<Cluster> {
        match self.begin_destroy(id).await? {
            DestroyStart::AlreadyDestroyed(cluster) => {
                debug!(parent: &self.span, cluster_id = %id, "Cluster already destroyed");
                Ok(cluster)
            }
            DestroyStart::Started(cluster, token) => self.run_destroy(cluster, token).await,
        }
    }

    /// Validate and move the cluster into `destroying`, then destroy it in the
    /// background. Returns the `destroying` record.
    pub async fn request_delete(&self, id: &str) -> Result<Cluster> {
        match self.begin_destroy(id).await? {
            DestroyStart::AlreadyDestroyed(cluster) => Ok(cluster),
            DestroyStart::Started(cluster, token) => {
                let service = self.clone();
                let record = cluster.clone();
                self.background.spawn(async move {
                    let _ = service.run_destroy(record, token).await;
                });
                Ok(cluster)
            }
        }
    }

    /// Expired records eligible for reaping, excluding anything in flight
    pub async fn get_expired_clusters(&self) -> Result<Vec<Cluster>> {
        let mut conn = self.pool.acquire().await?;
        let expired =
            Cluster::find_expired(&mut *conn, Utc::now(), self.settings.max_destroy_attempts)
                .await?;

        Ok(expired
            .into_iter()
            .filter(|cluster| !self.in_flight.is_in_flight(&cluster.id))
            .collect())
    }

    /// Physically remove destroyed records and records whose destroy retries
    /// are exhausted. Returns the number of records removed.
    pub async fn purge_reclaimed(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let candidates =
            Cluster::find_reclaimable(&mut *tx, self.settings.max_destroy_attempts).await?;

        let mut purged = 0;
        for cluster in candidates {
            if self.in_flight.is_in_flight(&cluster.id) {
                continue;
            }
            if cluster.status == ClusterStatus::DestroyFailed {
                error!(
                    parent: &self.span,
                    cluster_id = %cluster.id,
                    destroy_attempts = cluster.destroy_attempts,
                    message = cluster.message.as_deref().unwrap_or(""),
                    "Abandoning cluster after exhausting destroy attempts; infrastructure may still exist"
                );
            }
            if Cluster::delete(&mut *tx, &cluster.id).await? {
                purged += 1;
            }
        }
        tx.commit().await?;

        if purged > 0 {
            info!(parent: &self.span, purged, "Reclaimed cluster records purged");
        }
        Ok(purged)
    }

    /// Fail records left in an in-progress status with no orchestration
    /// running: work interrupted by a previous process, or a round whose
    /// outcome could not be written. Runs at startup and at the start of
    /// every sweep; records with a live orchestration are left alone.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let interrupted = Cluster::find_interrupted(&mut *tx).await?;

        let mut recovered = 0;
        for mut cluster in interrupted {
            if self.in_flight.is_in_flight(&cluster.id) {
                continue;
            }
            let from = cluster.status;
            match from {
                ClusterStatus::Requested => {
                    ClusterStateMachine::transition(&mut cluster, ClusterEvent::Provision)?;
                    ClusterStateMachine::transition(
                        &mut cluster,
                        ClusterEvent::fail_provision(messages::INTERRUPTED_PROVISION),
                    )?;
                }
                ClusterStatus::Provisioning => {
                    ClusterStateMachine::transition(
                        &mut cluster,
                        ClusterEvent::fail_provision(messages::INTERRUPTED_PROVISION),
                    )?;
                }
                ClusterStatus::Destroying => {
                    ClusterStateMachine::transition(
                        &mut cluster,
                        ClusterEvent::fail_destroy(messages::INTERRUPTED_DESTROY),
                    )?;
                }
                _ => continue,
            }
            Cluster::update(&mut *tx, &cluster).await?;
            warn!(
                parent: &self.span,
                cluster_id = %cluster.id,
                from = %from,
                to = %cluster.status,
                "Recovered interrupted cluster"
            );
            recovered += 1;
        }
        tx.commit().await?;

        Ok(recovered)
    }

    pub async fn engine_version(&self) -> Result<String> {
        self.engine.version().await
    }

    /// Wait until every background orchestration started so far has finished
    pub async fn wait_for_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    pub fn background_tasks(&self) -> usize {
        self.background.len()
    }

    async fn provision(self, id: String, token: InFlightToken) {
        let span = info_span!(parent: &self.span, "provision", cluster_id = %id);

        async move {
            let started = Instant::now();
            let cluster = match self
                .start_round(&id, ClusterEvent::Provision, messages::PROVISION_STARTED)
                .await
            {
                Ok(cluster) => cluster,
                Err(e) => {
                    error!(error = %e, "Failed to start provisioning");
                    return;
                }
            };
            info!("Provisioning started");

            let outcome = guard_engine(self.engine.apply(&cluster.config, cluster.state.as_deref())).await;

            match self.finish_provision(&id, outcome).await {
                Ok(cluster) => info!(
                    status = %cluster.status,
                    duration_ms = started.elapsed().as_millis() as u64,
                    message = cluster.message.as_deref().unwrap_or(""),
                    "Provisioning finished"
                ),
                Err(e) => error!(error = %e, "Failed to record provisioning outcome"),
            }
            drop(token);
        }
        .instrument(span)
        .await
    }

    async fn begin_destroy(&self, id: &str) -> Result<DestroyStart> {
        if id.trim().is_empty() {
            return Err(ProvisionerError::NotFound("cluster id must not be empty".to_string()));
        }
        let token = self.in_flight.try_claim(id, OrchestrationKind::Destroy)?;

        let mut tx = self.pool.begin().await?;
        let mut cluster = Cluster::find_by_id(&mut *tx, id).await?;
        if cluster.status == ClusterStatus::Destroyed {
            return Ok(DestroyStart::AlreadyDestroyed(cluster));
        }

        ClusterStateMachine::transition(&mut cluster, ClusterEvent::Destroy)?;
        cluster.message = Some(messages::DESTROY_STARTED.to_string());
        Cluster::update(&mut *tx, &cluster).await?;
        tx.commit().await?;

        Ok(DestroyStart::Started(cluster, token))
    }

    async fn run_destroy(&self, cluster: Cluster, token: InFlightToken) -> Result<Cluster> {
        let span = info_span!(parent: &self.span, "destroy", cluster_id = %cluster.id);

        async move {
            let started = Instant::now();
            info!(attempt = cluster.destroy_attempts + 1, "Destroy started");

            let outcome =
                guard_engine(self.engine.destroy(&cluster.config, cluster.state.as_deref())).await;
            let result = self.finish_destroy(&cluster.id, outcome).await;
            drop(token);

            match &result {
                Ok(cluster) => info!(
                    status = %cluster.status,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Destroy finished"
                ),
                Err(e) if e.is_engine_failure() => warn!(
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Destroy failed"
                ),
                Err(e) => error!(error = %e, "Failed to record destroy outcome"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Apply `event` to a stored record and commit, returning the new record
    async fn start_round(&self, id: &str, event: ClusterEvent, message: &str) -> Result<Cluster> {
        let mut tx = self.pool.begin().await?;
        let mut cluster = Cluster::find_by_id(&mut *tx, id).await?;
        ClusterStateMachine::transition(&mut cluster, event)?;
        cluster.message = Some(message.to_string());
        Cluster::update(&mut *tx, &cluster).await?;
        tx.commit().await?;
        Ok(cluster)
    }

    async fn finish_provision(&self, id: &str, outcome: Result<ApplyOutcome>) -> Result<Cluster> {
        let mut tx = self.pool.begin().await?;
        let mut cluster = Cluster::find_by_id(&mut *tx, id).await?;

        match outcome {
            Ok(applied) => {
                cluster.state = Some(applied.state);
                cluster.outputs = applied.outputs;
                cluster.message = Some(applied.message);
                ClusterStateMachine::transition(&mut cluster, ClusterEvent::ProvisionSucceeded)?;
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "Provisioning failed");
                ClusterStateMachine::transition(
                    &mut cluster,
                    ClusterEvent::fail_provision(e.to_string()),
                )?;
            }
        }

        Cluster::update(&mut *tx, &cluster).await?;
        tx.commit().await?;
        Ok(cluster)
    }

    /// Persist a destroy outcome; an engine failure is returned after it has
    /// been recorded
    async fn finish_destroy(&self, id: &str, outcome: Result<DestroyOutcome>) -> Result<Cluster> {
        let mut tx = self.pool.begin().await?;
        let mut cluster = Cluster::find_by_id(&mut *tx, id).await?;

        let failure = match outcome {
            Ok(destroyed) => {
                if let Some(state) = destroyed.state {
                    cluster.state = Some(state);
                }
                cluster.outputs.clear();
                cluster.message = Some(destroyed.message);
                ClusterStateMachine::transition(&mut cluster, ClusterEvent::DestroySucceeded)?;
                None
            }
            Err(e) => {
                ClusterStateMachine::transition(
                    &mut cluster,
                    ClusterEvent::fail_destroy(e.to_string()),
                )?;
                Some(e)
            }
        };

        Cluster::update(&mut *tx, &cluster).await?;
        tx.commit().await?;

        match failure {
            None => Ok(cluster),
            Some(e) => Err(e),
        }
    }
}

/// Reject empty, non-JSON and non-object configurations
fn validate_config(config: &[u8]) -> Result<()> {
    if config.iter().all(u8::is_ascii_whitespace) {
        return Err(ProvisionerError::InvalidConfig(
            "configuration must not be empty".to_string(),
        ));
    }
    let document: serde_json::Value = serde_json::from_slice(config).map_err(|e| {
        ProvisionerError::InvalidConfig(format!("configuration is not valid JSON: {e}"))
    })?;
    if !document.is_object() {
        return Err(ProvisionerError::InvalidConfig(
            "configuration must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

/// Run an engine future, turning a panic into an `EngineError`
async fn guard_engine<T>(operation: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ProvisionerError::EngineError(format!(
            "engine panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config() {
        assert!(validate_config(br#"{"provider":{"google":{}}}"#).is_ok());

        for bad in [&b""[..], b"   \n", b"not json", b"[1,2]", b"\"text\""] {
            assert_eq!(
                validate_config(bad).unwrap_err().code(),
                "INVALID_CONFIG",
                "{:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    async fn exploding_apply() -> Result<()> {
        panic!("provider crashed")
    }

    #[tokio::test]
    async fn test_guard_engine_catches_panics() {
        let result = guard_engine(exploding_apply()).await;
        assert_eq!(
            result.unwrap_err(),
            ProvisionerError::EngineError("engine panicked: provider crashed".to_string())
        );

        let passthrough = guard_engine(async { Ok::<_, ProvisionerError>(7) }).await;
        assert_eq!(passthrough.unwrap(), 7);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ProvisionerConfig::default();
        config.cluster.ttl = "2h".to_string();
        config.reaper.max_destroy_attempts = 3;

        let settings = LifecycleSettings::from_config(&config).unwrap();
        assert_eq!(settings.cluster_ttl, Duration::from_secs(7200));
        assert_eq!(settings.max_destroy_attempts, 3);
    }
}
