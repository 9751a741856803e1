//! # Orchestration
//!
//! Drives clusters through their lifecycle.
//!
//! ## Core Components
//!
//! - **LifecycleService**: create, read and delete operations; runs each apply
//!   or destroy round and records its outcome
//! - **ExpirySweeper**: periodic background reaping of expired clusters
//! - **ProvisioningEngine**: the seam to the infrastructure engine, with
//!   **TerraformEngine** as the production implementation
//! - **Workspace** and **CommandRunner**: the ephemeral directory and the
//!   timeout-bounded subprocess behind each engine run
//! - **error_classifier**: maps engine output to typed errors and change
//!   summaries
//! - **InFlightRegistry**: at most one orchestration per cluster id

pub mod command_runner;
pub mod engine;
pub mod error_classifier;
pub mod in_flight;
pub mod lifecycle;
pub mod sweeper;
pub mod terraform;
pub mod workspace;

pub use command_runner::{CommandOutput, CommandRunner};
pub use engine::{parse_state_outputs, ApplyOutcome, DestroyOutcome, ProvisioningEngine};
pub use error_classifier::{classify_failure, ChangeSummary, EngineStep};
pub use in_flight::{InFlightRegistry, InFlightToken, OrchestrationKind};
pub use lifecycle::{LifecycleService, LifecycleSettings};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use terraform::{EngineSettings, TerraformEngine};
pub use workspace::Workspace;
