//! # Database Operations
//!
//! SQLite persistence for cluster records.
//!
//! ## Key Components
//!
//! - [`connection`] - Pool creation, embedded migrations and health checks
//!
//! Record-level operations live on the [`Cluster`](crate::models::Cluster)
//! model and always run against a caller-supplied connection, normally
//! `&mut *tx` for a transaction begun by the lifecycle service.

pub mod connection;

pub use connection::{create_in_memory_pool, create_pool, health_check, run_migrations};
