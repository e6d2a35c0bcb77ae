use serde::Deserialize;

use crate::types::{AuthorizationState, WebhookSettings};

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the task backend (e.g. http://localhost:8000)
    pub task_api_url: String,

    /// Optional bearer token for the task backend
    pub task_api_token: Option<String>,

    /// Delay between deadline sweeps in seconds (default: 300 = 5 min)
    pub check_interval_secs: u64,

    /// Accelerated delay when a deadline is near (default: 60)
    pub urgent_check_interval_secs: u64,

    /// How close a deadline must be, in minutes, to switch to the
    /// accelerated delay (default: 120)
    pub urgent_window_minutes: u64,

    /// Environment answer for local alert authorization
    /// (granted | denied | undetermined; default: granted)
    pub local_alert_authorization: AuthorizationState,

    /// Outbound webhook URL (webhook channel is absent when unset)
    pub webhook_url: Option<String>,

    /// Whether webhook delivery is enabled (default: false)
    pub webhook_enabled: bool,

    /// Timeout in seconds for outbound HTTP calls (default: 10)
    pub notify_send_timeout_secs: u64,

    /// Path to the sqlite dedup database; delivered-notification state is
    /// kept in memory when unset
    pub dedup_db_path: Option<String>,

    /// Bind address for the control API (default: 127.0.0.1:3300)
    pub api_bind_addr: String,

    /// Start the scheduler immediately on boot (default: true)
    pub engine_autostart: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            task_api_url: std::env::var("TASK_API_URL")
                .map_err(|_| anyhow::anyhow!("TASK_API_URL environment variable is required"))?,
            task_api_token: std::env::var("TASK_API_TOKEN").ok(),
            check_interval_secs: std::env::var("CHECK_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CHECK_INTERVAL_SECS must be a valid u64"))?,
            urgent_check_interval_secs: std::env::var("URGENT_CHECK_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("URGENT_CHECK_INTERVAL_SECS must be a valid u64"))?,
            urgent_window_minutes: std::env::var("URGENT_WINDOW_MINUTES")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("URGENT_WINDOW_MINUTES must be a valid u64"))?,
            local_alert_authorization: std::env::var("LOCAL_ALERT_AUTHORIZATION")
                .unwrap_or_else(|_| "granted".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("LOCAL_ALERT_AUTHORIZATION: {}", e))?,
            webhook_url: std::env::var("WEBHOOK_URL").ok(),
            webhook_enabled: std::env::var("WEBHOOK_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WEBHOOK_ENABLED must be true or false"))?,
            notify_send_timeout_secs: std::env::var("NOTIFY_SEND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFY_SEND_TIMEOUT_SECS must be a valid u64"))?,
            dedup_db_path: std::env::var("DEDUP_DB_PATH").ok(),
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3300".to_string()),
            engine_autostart: std::env::var("ENGINE_AUTOSTART")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("ENGINE_AUTOSTART must be true or false"))?,
        })
    }

    /// Webhook settings derived from configuration, if a URL is present.
    pub fn webhook_settings(&self) -> Option<WebhookSettings> {
        self.webhook_url.as_ref().map(|url| WebhookSettings {
            webhook_url: url.clone(),
            is_enabled: self.webhook_enabled,
        })
    }
}
