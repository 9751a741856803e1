//! # Expiry Sweeper
//!
//! Periodically destroys clusters whose `expires_at` has passed.
//!
//! Each tick runs one sweep to completion before the next tick is considered,
//! so sweeps never overlap; ticks that fire during a long sweep are skipped.
//! Within a sweep, expired clusters are destroyed one at a time and a failure
//! on one does not stop the others. Each sweep starts by failing records left
//! in an in-progress status with no orchestration running, so they become
//! deletable and reapable again, and ends by purging reclaimed records.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::{ConfigResult, ProvisionerConfig};
use crate::error::ProvisionerError;
use crate::orchestration::lifecycle::LifecycleService;

/// What one sweep did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub correlation_id: Uuid,
    /// Stranded in-progress records moved to a failed status
    pub recovered: usize,
    /// Expired clusters found
    pub expired: usize,
    pub destroyed: usize,
    pub failed: usize,
    /// Clusters a foreground request was already working on
    pub skipped: usize,
    pub purged: u64,
}

impl SweepReport {
    fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            recovered: 0,
            expired: 0,
            destroyed: 0,
            failed: 0,
            skipped: 0,
            purged: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    service: LifecycleService,
    interval: Duration,
    span: Span,
}

impl ExpirySweeper {
    pub fn new(service: LifecycleService, interval: Duration, parent: Span) -> Self {
        Self {
            service,
            interval,
            span: parent,
        }
    }

    /// Build from `reaper.interval`; an unparsable or zero interval is fatal
    pub fn from_config(
        service: LifecycleService,
        config: &ProvisionerConfig,
        parent: Span,
    ) -> ConfigResult<Self> {
        Ok(Self::new(service, config.reap_interval()?, parent))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one full pass over the expired clusters
    pub async fn sweep(&self) -> SweepReport {
        let correlation_id = Uuid::new_v4();
        let span = info_span!(parent: &self.span, "sweep", correlation_id = %correlation_id);

        async move {
            let started = Instant::now();
            let mut report = SweepReport::new(correlation_id);

            match self.service.recover_interrupted().await {
                Ok(recovered) => report.recovered = recovered,
                Err(e) => error!(error = %e, "Failed to recover stranded clusters"),
            }

            match self.service.get_expired_clusters().await {
                Ok(expired) => {
                    report.expired = expired.len();
                    if !expired.is_empty() {
                        info!(expired = expired.len(), "Reaping expired clusters");
                    }

                    for cluster in expired {
                        match self.service.delete_cluster(&cluster.id).await {
                            Ok(destroyed) => {
                                report.destroyed += 1;
                                debug!(cluster_id = %destroyed.id, status = %destroyed.status, "Expired cluster destroyed");
                            }
                            Err(ProvisionerError::ConflictInProgress(_)) => {
                                report.skipped += 1;
                                debug!(cluster_id = %cluster.id, "Expired cluster already has an orchestration in progress");
                            }
                            Err(e) => {
                                report.failed += 1;
                                warn!(cluster_id = %cluster.id, error = %e, "Failed to destroy expired cluster");
                            }
                        }
                    }
                }
                Err(e) => error!(error = %e, "Failed to list expired clusters"),
            }

            match self.service.purge_reclaimed().await {
                Ok(purged) => report.purged = purged,
                Err(e) => error!(error = %e, "Failed to purge reclaimed clusters"),
            }

            info!(
                recovered = report.recovered,
                expired = report.expired,
                destroyed = report.destroyed,
                failed = report.failed,
                skipped = report.skipped,
                purged = report.purged,
                duration_ms = started.elapsed().as_millis() as u64,
                "Sweep complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Sweep every interval until `shutdown` is cancelled. The first sweep
    /// runs one interval after start. A sweep in progress is finished before
    /// shutdown is observed.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            parent: &self.span,
            interval = %humantime::format_duration(self.interval),
            "Expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(parent: &self.span, "Expiry sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
