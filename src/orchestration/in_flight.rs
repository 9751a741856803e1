//! Per-cluster exclusion for orchestrations.
//!
//! At most one apply or destroy runs for a given cluster id at any time. A
//! claim returns an [`InFlightToken`]; the claim is released when the token is
//! dropped, on success, failure or panic alike.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::error::{ProvisionerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationKind {
    Provision,
    Destroy,
}

impl fmt::Display for OrchestrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision => f.write_str("provision"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlightEntry {
    kind: OrchestrationKind,
    started_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    entries: Arc<DashMap<String, InFlightEntry>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id` for one orchestration, or fail with `ConflictInProgress`
    pub fn try_claim(&self, id: &str, kind: OrchestrationKind) -> Result<InFlightToken> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(existing) => {
                let existing = *existing.get();
                Err(ProvisionerError::ConflictInProgress(format!(
                    "{id} ({} running for {}s)",
                    existing.kind,
                    existing.started_at.elapsed().as_secs()
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlightEntry {
                    kind,
                    started_at: Instant::now(),
                });
                trace!(cluster_id = %id, kind = %kind, "Orchestration claimed");
                Ok(InFlightToken {
                    entries: Arc::clone(&self.entries),
                    id: id.to_string(),
                    kind,
                })
            }
        }
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exclusive claim on one cluster id
#[derive(Debug)]
pub struct InFlightToken {
    entries: Arc<DashMap<String, InFlightEntry>>,
    id: String,
    kind: OrchestrationKind,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.entries.remove(&self.id);
        trace!(cluster_id = %self.id, kind = %self.kind, "Orchestration released");
    }
}
