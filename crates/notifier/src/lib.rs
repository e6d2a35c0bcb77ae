//! Delivery channels for deadline alerts.
//!
//! Channels are independent: the scheduler fans each alert out to every
//! enabled channel, and one failing channel never blocks the others.

pub mod local;
pub mod webhook;

use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{AuthorizationState, DeadlineAlert, NotificationType};

pub use local::LocalAlertChannel;
pub use webhook::WebhookChannel;

/// A destination that can receive deadline alerts.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Stable channel name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Whether this channel should receive alerts right now.
    fn is_enabled(&self) -> bool;

    /// Ask for permission to deliver. The scheduler calls this once on
    /// start; `Denied` aborts the start.
    async fn request_authorization(&self) -> AuthorizationState;

    /// Deliver one alert.
    async fn send(&self, alert: &DeadlineAlert) -> Result<(), AppError>;
}

/// User-facing category label for an urgency bucket.
pub fn category_label(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::TwoDaysLeft => "仅剩2天",
        NotificationType::TwentyFourHoursLeft => "仅剩24小时",
        NotificationType::DeadlineArrived => "已过期",
    }
}
