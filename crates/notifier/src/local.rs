//! Local alert channel, the in-process rendition of a desktop notification.
//!
//! Alerts are rendered into short messages and kept in a bounded feed the
//! client UI polls. Platform behavior is modeled on the feed: a repeated
//! tag replaces the earlier entry, informational alerts expire after a few
//! seconds, and an arrived deadline stays until dismissed.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use herald_common::error::AppError;
use herald_common::types::{AuthorizationState, DeadlineAlert, NotificationType};

use crate::{DeliveryChannel, category_label};

/// Maximum entries retained in the alert feed.
const FEED_CAPACITY: usize = 100;

/// How long a non-critical alert stays visible, in milliseconds.
const AUTO_CLOSE_MS: u64 = 5000;

/// A rendered alert in the local feed.
#[derive(Debug, Clone, Serialize)]
pub struct LocalAlert {
    pub title: String,
    pub body: String,
    /// Stable identity: one visible alert per task and threshold.
    pub tag: String,
    /// Arrived deadlines demand an explicit dismissal.
    pub require_interaction: bool,
    /// Auto-dismiss delay for everything else.
    pub auto_close_ms: Option<u64>,
    pub posted_at: DateTime<Utc>,
}

impl LocalAlert {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.auto_close_ms {
            Some(ms) => now - self.posted_at > chrono::Duration::milliseconds(ms as i64),
            None => false,
        }
    }
}

/// Render an alert into the message shown to the user.
fn render(alert: &DeadlineAlert) -> LocalAlert {
    let sticky = alert.kind == NotificationType::DeadlineArrived;
    LocalAlert {
        title: format!("任务提醒：{}", category_label(alert.kind)),
        body: format!(
            "「{}」截止时间 {}",
            alert.task_title,
            alert
                .deadline
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
        ),
        tag: format!("task-{}-{}", alert.task_id, alert.kind),
        require_interaction: sticky,
        auto_close_ms: if sticky { None } else { Some(AUTO_CLOSE_MS) },
        posted_at: Utc::now(),
    }
}

/// Channel that surfaces alerts to the local client feed.
pub struct LocalAlertChannel {
    /// Standing permission answer from the environment.
    authorization: AuthorizationState,
    feed: Mutex<VecDeque<LocalAlert>>,
}

impl LocalAlertChannel {
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            authorization,
            feed: Mutex::new(VecDeque::new()),
        }
    }

    fn lock_feed(&self) -> std::sync::MutexGuard<'_, VecDeque<LocalAlert>> {
        self.feed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, message: LocalAlert) {
        let mut feed = self.lock_feed();
        feed.retain(|existing| existing.tag != message.tag);
        feed.push_back(message);
        while feed.len() > FEED_CAPACITY {
            feed.pop_front();
        }
    }

    /// Current feed contents, oldest first. Expired entries are pruned.
    pub fn alerts(&self) -> Vec<LocalAlert> {
        let now = Utc::now();
        let mut feed = self.lock_feed();
        feed.retain(|alert| !alert.is_expired(now));
        feed.iter().cloned().collect()
    }

    /// Remove one alert by tag. Returns whether anything was removed.
    pub fn dismiss(&self, tag: &str) -> bool {
        let mut feed = self.lock_feed();
        let before = feed.len();
        feed.retain(|alert| alert.tag != tag);
        feed.len() < before
    }
}

#[async_trait]
impl DeliveryChannel for LocalAlertChannel {
    fn name(&self) -> &'static str {
        "local_alert"
    }

    fn is_enabled(&self) -> bool {
        self.authorization == AuthorizationState::Granted
    }

    async fn request_authorization(&self) -> AuthorizationState {
        tracing::info!(
            state = %self.authorization,
            "Local alert authorization resolved from configuration"
        );
        self.authorization
    }

    async fn send(&self, alert: &DeadlineAlert) -> Result<(), AppError> {
        if !self.is_enabled() {
            return Err(AppError::ChannelSend {
                channel: "local_alert".to_string(),
                reason: "authorization not granted".to_string(),
            });
        }

        let message = render(alert);
        tracing::debug!(tag = %message.tag, "Local alert posted");
        self.post(message);
        Ok(())
    }
}
