//! Task retrieval for the notification engine.
//!
//! The engine only sees the `TaskSource` trait. The production
//! implementation polls the task backend over HTTP; tests substitute
//! in-memory sources.

pub mod http;

use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::Task;

pub use http::HttpTaskSource;

/// A provider of tasks eligible for deadline checking.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Fetch the tasks that may still need deadline alerts.
    ///
    /// Implementations should pre-filter obviously irrelevant tasks
    /// (completed, no deadline, long past due); the analyzer re-checks
    /// relevance before alerting either way.
    async fn fetch_active_tasks(&self) -> Result<Vec<Task>, AppError>;
}
