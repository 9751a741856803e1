//! Shared test harness: a scripted engine and a lifecycle service backed by
//! an in-memory database.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::Semaphore;

use provisioner_core::database::create_in_memory_pool;
use provisioner_core::orchestration::{
    ApplyOutcome, DestroyOutcome, LifecycleService, LifecycleSettings, ProvisioningEngine,
};
use provisioner_core::{Cluster, ClusterOutput, ClusterStatus, ProvisionerError, Result};

/// Scenario markers understood by [`FakeEngine`], embedded in the config
pub const FAIL_APPLY: &str = "fail-apply";
pub const FAIL_DESTROY: &str = "fail-destroy";
pub const PANIC_APPLY: &str = "panic-apply";

pub const APPLIED_STATE: &[u8] = br#"{"version":4,"serial":1}"#;
pub const DESTROYED_STATE: &[u8] = br#"{"version":4,"serial":2}"#;
pub const FAKE_VERSION: &str = "Terraform v1.5.7";

/// A valid configuration; `scenario` selects the fake engine's behaviour
pub fn config_with(scenario: &str) -> Vec<u8> {
    json!({
        "provider": {"google": {}},
        "locals": {"scenario": scenario}
    })
    .to_string()
    .into_bytes()
}

pub fn valid_config() -> Vec<u8> {
    config_with("ok")
}

/// Engine double. Behaviour is chosen per cluster by markers in the config.
/// A gated engine blocks every apply and destroy until a permit is added.
#[derive(Default)]
pub struct FakeEngine {
    apply_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let engine = Arc::new(Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        });
        (engine, gate)
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    async fn apply(&self, config: &[u8], _prior_state: Option<&[u8]>) -> Result<ApplyOutcome> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;

        let config = String::from_utf8_lossy(config);
        if config.contains(PANIC_APPLY) {
            panic!("provider plugin crashed");
        }
        if config.contains(FAIL_APPLY) {
            return Err(ProvisionerError::EngineError(
                "apply failed: Error: googleapi: Error 403: quota exceeded".to_string(),
            ));
        }

        Ok(ApplyOutcome {
            state: APPLIED_STATE.to_vec(),
            outputs: vec![
                ClusterOutput {
                    name: "endpoint".to_string(),
                    sensitive: false,
                    output_type: json!("string"),
                    value: json!("10.0.0.1"),
                },
                ClusterOutput {
                    name: "kubeconfig".to_string(),
                    sensitive: true,
                    output_type: json!("string"),
                    value: json!("apiVersion: v1"),
                },
            ],
            message: "Apply complete! Resources: 1 added, 0 changed, 0 destroyed.".to_string(),
        })
    }

    async fn destroy(&self, config: &[u8], _prior_state: Option<&[u8]>) -> Result<DestroyOutcome> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;

        if String::from_utf8_lossy(config).contains(FAIL_DESTROY) {
            return Err(ProvisionerError::EngineError(
                "destroy failed: Error: resource is in use".to_string(),
            ));
        }

        Ok(DestroyOutcome {
            state: Some(DESTROYED_STATE.to_vec()),
            message: "Destroy complete! Resources: 1 destroyed.".to_string(),
        })
    }

    async fn version(&self) -> Result<String> {
        Ok(FAKE_VERSION.to_string())
    }
}

pub fn settings(cluster_ttl: Duration, max_destroy_attempts: u32) -> LifecycleSettings {
    LifecycleSettings {
        cluster_ttl,
        max_destroy_attempts,
    }
}

pub async fn service_with(engine: Arc<FakeEngine>, settings: LifecycleSettings) -> LifecycleService {
    let pool = create_in_memory_pool()
        .await
        .expect("in-memory pool should be created");
    LifecycleService::new(pool, engine, settings, tracing::Span::none())
}

pub async fn service(engine: Arc<FakeEngine>) -> LifecycleService {
    service_with(engine, settings(Duration::from_secs(3600), 3)).await
}

/// Poll until the cluster reaches `status` or five seconds pass
pub async fn wait_for_status(service: &LifecycleService, id: &str, status: ClusterStatus) -> Cluster {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let cluster = service.get_cluster(id).await.expect("cluster should exist");
        if cluster.status == status {
            return cluster;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "cluster {id} stuck in {} waiting for {status}",
            cluster.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until an orchestration for `id` is in flight
pub async fn wait_for_in_flight(service: &LifecycleService, id: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !service.in_flight().is_in_flight(id) {
        assert!(tokio::time::Instant::now() < deadline, "no orchestration started for {id}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Create a cluster and wait for provisioning to succeed
pub async fn provisioned(service: &LifecycleService, config: Vec<u8>) -> Cluster {
    let cluster = service
        .create_cluster(config, None)
        .await
        .expect("create should be accepted");
    wait_for_status(service, &cluster.id, ClusterStatus::ProvisionSuccess).await
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Move a cluster's expiry into the past
pub async fn expire(service: &LifecycleService, id: &str) {
    set_expiry(service, id, Utc::now() - chrono::Duration::minutes(5)).await;
}

pub async fn set_expiry(service: &LifecycleService, id: &str, at: DateTime<Utc>) {
    sqlx::query("UPDATE clusters SET expires_at = ? WHERE id = ?")
        .bind(timestamp(at))
        .bind(id)
        .execute(service.pool())
        .await
        .expect("expiry update should succeed");
}

/// Insert a record directly, bypassing the lifecycle service
pub async fn insert_with_status(
    service: &LifecycleService,
    status: ClusterStatus,
    expires_at: DateTime<Utc>,
) -> Cluster {
    let mut cluster = Cluster::new(valid_config(), None, Duration::from_secs(3600));
    cluster.status = status;
    cluster.expires_at = expires_at;

    let mut conn = service.pool().acquire().await.expect("connection");
    Cluster::insert(&mut *conn, &cluster)
        .await
        .expect("insert should succeed");
    cluster
}
