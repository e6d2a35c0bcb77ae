//! Webhook channel: POSTs deadline alerts to a user-configured URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use herald_common::error::AppError;
use herald_common::types::{AuthorizationState, DeadlineAlert, WebhookSettings};

use crate::{DeliveryChannel, category_label};

/// Default timeout for a webhook POST.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Flat JSON document POSTed to the webhook URL.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub task_title: String,
    pub task_content: String,
    /// ISO 8601 deadline.
    pub deadline: String,
    pub deadline_category: String,
}

impl WebhookPayload {
    /// Build the wire payload for an alert.
    pub fn from_alert(alert: &DeadlineAlert) -> Self {
        Self {
            task_title: alert.task_title.clone(),
            task_content: alert.task_content.clone(),
            deadline: alert.deadline.to_rfc3339(),
            deadline_category: category_label(alert.kind).to_string(),
        }
    }
}

/// Channel that forwards alerts to an external webhook endpoint.
pub struct WebhookChannel {
    client: reqwest::Client,
    settings: Option<WebhookSettings>,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(settings: Option<WebhookSettings>) -> Self {
        Self::with_timeout(settings, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_timeout(settings: Option<WebhookSettings>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            timeout,
        }
    }

    /// The URL to deliver to, present only when the channel is usable.
    fn target_url(&self) -> Option<&str> {
        self.settings
            .as_ref()
            .filter(|s| s.is_enabled && !s.webhook_url.is_empty())
            .map(|s| s.webhook_url.as_str())
    }

    async fn post(&self, payload: &WebhookPayload) -> Result<(), AppError> {
        let Some(url) = self.target_url() else {
            return Err(AppError::ChannelSend {
                channel: "webhook".to_string(),
                reason: "webhook is not configured".to_string(),
            });
        };

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::ChannelSend {
                channel: "webhook".to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AppError::ChannelSend {
                channel: "webhook".to_string(),
                reason: format!("remote returned HTTP {}", response.status()),
            });
        }

        tracing::debug!(category = %payload.deadline_category, "Webhook delivered");
        Ok(())
    }

    /// Send a fixed verification message so users can validate their URL.
    pub async fn send_test(&self) -> Result<(), AppError> {
        let payload = WebhookPayload {
            task_title: "测试通知".to_string(),
            task_content: "这是一条测试消息，用于验证 Webhook 配置。".to_string(),
            deadline: chrono::Utc::now().to_rfc3339(),
            deadline_category: "测试".to_string(),
        };
        self.post(&payload).await
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.target_url().is_some()
    }

    async fn request_authorization(&self) -> AuthorizationState {
        // No platform gate; the settings toggle is the only control.
        AuthorizationState::Granted
    }

    async fn send(&self, alert: &DeadlineAlert) -> Result<(), AppError> {
        self.post(&WebhookPayload::from_alert(alert)).await
    }
}
