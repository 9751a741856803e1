#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Provisioner Core
//!
//! Asynchronous cluster provisioning on top of an infrastructure-as-code
//! engine run as a subprocess.
//!
//! ## Overview
//!
//! A caller submits an engine configuration; the service records a cluster in
//! `requested` status and returns immediately, then drives the engine's
//! `init`/`plan`/`apply` sequence in the background and records the outcome.
//! Every cluster carries an expiry; a periodic sweep destroys expired
//! clusters through the same path an explicit delete uses.
//!
//! ## Module Organization
//!
//! - [`models`] - The `Cluster` record and its store operations
//! - [`database`] - SQLite pool creation and embedded migrations
//! - [`state_machine`] - Cluster statuses and the transition table
//! - [`orchestration`] - Lifecycle service, expiry sweeper and the engine
//! - [`web`] - HTTP surface
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use provisioner_core::config::ConfigManager;
//! use provisioner_core::database::create_pool;
//! use provisioner_core::orchestration::{LifecycleService, LifecycleSettings, TerraformEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(None)?;
//! let config = manager.config();
//!
//! let pool = create_pool(&config.database).await?;
//! let service = LifecycleService::new(
//!     pool,
//!     Arc::new(TerraformEngine::from_config(config)?),
//!     LifecycleSettings::from_config(config)?,
//!     tracing::info_span!("provisioner"),
//! );
//!
//! for cluster in service.get_clusters().await? {
//!     println!("{} {} {}", cluster.id, cluster.name, cluster.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Integration tests run against an in-memory SQLite pool with a scripted
//! [`ProvisioningEngine`](orchestration::ProvisioningEngine) standing in for
//! the real engine.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod web;

pub use config::{ConfigManager, ConfigurationError, ProvisionerConfig};
pub use error::{ProvisionerError, Result};
pub use models::{Cluster, ClusterOutput};
pub use orchestration::{
    ExpirySweeper, LifecycleService, LifecycleSettings, ProvisioningEngine, TerraformEngine,
};
pub use state_machine::{ClusterEvent, ClusterStateMachine, ClusterStatus};
