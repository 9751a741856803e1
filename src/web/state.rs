//! # Web API Application State

use crate::orchestration::LifecycleService;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: LifecycleService,
}

impl AppState {
    pub fn new(service: LifecycleService) -> Self {
        Self { service }
    }
}
