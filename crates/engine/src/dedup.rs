//! Duplicate suppression for delivered alerts.
//!
//! Each (task, threshold) pair fires at most once between resets. The store
//! behind that guarantee is swappable: an in-memory map for tests and
//! single-run deployments, or SQLite when suppression must survive restarts.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use herald_common::error::AppError;
use herald_common::types::NotificationType;

/// Records which alert thresholds have already been delivered.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Check whether this threshold already fired for the task.
    async fn has_sent(&self, task_id: &str, kind: NotificationType) -> Result<bool, AppError>;

    /// Record a delivered threshold. Recording the same pair twice is a no-op.
    async fn mark_sent(&self, task_id: &str, kind: NotificationType) -> Result<(), AppError>;

    /// Forget all thresholds for one task so its alerts can fire again.
    async fn reset_task(&self, task_id: &str) -> Result<(), AppError>;

    /// Forget every recorded threshold.
    async fn reset_all(&self) -> Result<(), AppError>;
}

/// In-memory dedup store. State is lost on restart.
pub struct MemoryDedupStore {
    sent: Mutex<HashMap<String, HashSet<NotificationType>>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<NotificationType>>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of tasks with at least one recorded threshold.
    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for MemoryDedupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn has_sent(&self, task_id: &str, kind: NotificationType) -> Result<bool, AppError> {
        Ok(self
            .lock()
            .get(task_id)
            .is_some_and(|kinds| kinds.contains(&kind)))
    }

    async fn mark_sent(&self, task_id: &str, kind: NotificationType) -> Result<(), AppError> {
        self.lock()
            .entry(task_id.to_string())
            .or_default()
            .insert(kind);
        Ok(())
    }

    async fn reset_task(&self, task_id: &str) -> Result<(), AppError> {
        self.lock().remove(task_id);
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), AppError> {
        self.lock().clear();
        Ok(())
    }
}

/// SQLite-backed dedup store. Suppression state survives restarts.
pub struct SqliteDedupStore {
    pool: SqlitePool,
}

impl SqliteDedupStore {
    /// Open (or create) the database file at `path` and run the schema.
    pub async fn connect(path: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Build the store on an existing pool, creating the schema if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sent_notifications (
                task_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                PRIMARY KEY (task_id, kind)
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn has_sent(&self, task_id: &str, kind: NotificationType) -> Result<bool, AppError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM sent_notifications WHERE task_id = ?1 AND kind = ?2",
        )
        .bind(task_id)
        .bind(kind.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn mark_sent(&self, task_id: &str, kind: NotificationType) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sent_notifications (task_id, kind, sent_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (task_id, kind) DO NOTHING",
        )
        .bind(task_id)
        .bind(kind.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_task(&self, task_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sent_notifications WHERE task_id = ?1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sent_notifications")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
