//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_engine::scheduler::Scheduler;
use herald_notifier::{LocalAlertChannel, WebhookChannel};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub local_alerts: Arc<LocalAlertChannel>,
    /// Present only when a webhook URL is configured.
    pub webhook: Option<Arc<WebhookChannel>>,
}

impl AppState {
    pub fn new(
        scheduler: Scheduler,
        local_alerts: Arc<LocalAlertChannel>,
        webhook: Option<Arc<WebhookChannel>>,
    ) -> Self {
        Self {
            scheduler,
            local_alerts,
            webhook,
        }
    }
}
