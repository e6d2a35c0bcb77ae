//! HTTP task source polling the task backend's REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use herald_common::error::AppError;
use herald_common::types::{Task, TaskStatus};

use crate::TaskSource;

/// Tasks whose deadline passed more than this long ago are not worth
/// handing to the engine at all.
const RELEVANCE_FLOOR_HOURS: i64 = 24;

/// Wire representation of a task as returned by the backend.
///
/// The backend uses integer ids and naive datetimes; both are normalized
/// here so the rest of the system only sees [`Task`].
#[derive(Debug, Deserialize)]
struct ApiTask {
    id: i64,
    title: String,
    #[serde(default)]
    content: String,
    deadline: Option<String>,
    status: String,
}

impl ApiTask {
    fn into_task(self) -> Task {
        let deadline = self.deadline.as_deref().and_then(|raw| {
            let parsed = parse_deadline(raw);
            if parsed.is_none() {
                tracing::warn!(
                    task_id = self.id,
                    deadline = raw,
                    "Unparseable deadline, treating task as undated"
                );
            }
            parsed
        });

        let status = match self.status.as_str() {
            "completed" | "done" => TaskStatus::Done,
            _ => TaskStatus::Open,
        };

        Task {
            id: self.id.to_string(),
            title: self.title,
            content: self.content,
            deadline,
            status,
        }
    }
}

/// Parse a backend deadline string.
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DDTHH:MM:SS` form the
/// backend emits; naive timestamps are taken as UTC.
fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|dt| dt.and_utc())
}

/// Whether a task can still produce an alert: open, dated, and no more
/// than a day overdue.
fn is_relevant(task: &Task, now: DateTime<Utc>) -> bool {
    if !task.is_open() {
        return false;
    }
    match task.deadline {
        Some(deadline) => deadline >= now - chrono::Duration::hours(RELEVANCE_FLOOR_HOURS),
        None => false,
    }
}

/// Task source backed by the task backend's REST API.
pub struct HttpTaskSource {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpTaskSource {
    pub fn new(base_url: String, bearer_token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            timeout,
        }
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn fetch_active_tasks(&self) -> Result<Vec<Task>, AppError> {
        let url = format!("{}/api/tasks", self.base_url);
        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "task backend returned HTTP {}",
                response.status()
            )));
        }

        let raw: Vec<ApiTask> = response
            .json()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        let now = Utc::now();
        let tasks: Vec<Task> = raw
            .into_iter()
            .map(ApiTask::into_task)
            .filter(|task| is_relevant(task, now))
            .collect();

        tracing::debug!(count = tasks.len(), "Fetched active tasks");
        Ok(tasks)
    }
}
