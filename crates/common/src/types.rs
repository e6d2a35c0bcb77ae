use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task as reported by the task backend.
///
/// The backend distinguishes `pending` and `in_progress`; for deadline
/// alerting both are simply "still open", so they are collapsed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[serde(alias = "pending", alias = "in_progress")]
    Open,
    #[serde(alias = "completed")]
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Open => write!(f, "open"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

/// A task as seen by the notification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,
}

impl Task {
    /// Whether this task can still produce deadline alerts.
    pub fn is_open(&self) -> bool {
        self.status == TaskStatus::Open
    }
}

/// Urgency buckets for deadline alerts, ordered least to most urgent.
///
/// Each bucket fires at most once per task between dedup resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TwoDaysLeft,
    TwentyFourHoursLeft,
    DeadlineArrived,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::TwoDaysLeft => write!(f, "two_days_left"),
            NotificationType::TwentyFourHoursLeft => write!(f, "twenty_four_hours_left"),
            NotificationType::DeadlineArrived => write!(f, "deadline_arrived"),
        }
    }
}

/// A single threshold crossing detected for a task, ready for delivery.
#[derive(Debug, Clone)]
pub struct DeadlineAlert {
    pub task_id: String,
    pub task_title: String,
    pub task_content: String,
    pub deadline: DateTime<Utc>,
    pub kind: NotificationType,
    /// Signed time remaining at classification (negative once the deadline passed).
    pub time_remaining: Duration,
}

/// Delivery permission for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationState {
    /// Permission was never answered; the channel stays quiet but the
    /// engine may run.
    Undetermined,
    Granted,
    /// Hard refusal; starting the engine with a denied channel fails.
    Denied,
}

impl std::fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorizationState::Undetermined => write!(f, "undetermined"),
            AuthorizationState::Granted => write!(f, "granted"),
            AuthorizationState::Denied => write!(f, "denied"),
        }
    }
}

impl std::str::FromStr for AuthorizationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "granted" => Ok(AuthorizationState::Granted),
            "denied" => Ok(AuthorizationState::Denied),
            // "default" is what browser notification APIs call it
            "undetermined" | "default" => Ok(AuthorizationState::Undetermined),
            other => Err(format!(
                "expected granted, denied or undetermined, got '{}'",
                other
            )),
        }
    }
}

/// Outbound webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub webhook_url: String,
    pub is_enabled: bool,
}
