//! Deadline analyzer: classifies tasks into urgency buckets.
//!
//! For each task:
//! 1. Skip tasks that are done or have no deadline
//! 2. Compute signed time remaining against the check instant
//! 3. Map it onto the tightest matching bucket
//! 4. Consult the dedup store so each bucket fires at most once per task

use chrono::{DateTime, Duration, Utc};

use herald_common::error::AppError;
use herald_common::types::{DeadlineAlert, NotificationType, Task};

use crate::dedup::DedupStore;

/// Tasks whose deadline passed more than this long ago are ignored entirely.
const STALE_CUTOFF_HOURS: i64 = 24;

/// Window after the deadline during which "deadline arrived" still fires.
const ARRIVED_GRACE_HOURS: i64 = 1;

/// Stateless deadline classifier.
pub struct DeadlineAnalyzer;

impl DeadlineAnalyzer {
    /// Map a task onto its urgency bucket at the given instant.
    ///
    /// Buckets are evaluated tightest-first, so a task 30 minutes from its
    /// deadline reports `TwentyFourHoursLeft` even though it is also within
    /// two days:
    /// - `DeadlineArrived`: overdue by less than 1 hour
    /// - `TwentyFourHoursLeft`: due within 24 hours
    /// - `TwoDaysLeft`: due within 48 hours
    ///
    /// Returns the bucket together with the signed time remaining, or
    /// `None` for done tasks, undated tasks, tasks more than a day overdue,
    /// and tasks further than two days out.
    pub fn bucket(task: &Task, now: DateTime<Utc>) -> Option<(NotificationType, Duration)> {
        if !task.is_open() {
            return None;
        }
        let deadline = task.deadline?;
        let remaining = deadline - now;

        // Stale tasks dropped first, so widening the grace window later
        // cannot resurrect them
        if remaining < -Duration::hours(STALE_CUTOFF_HOURS) {
            return None;
        }

        let kind = if remaining <= Duration::zero() {
            if remaining > -Duration::hours(ARRIVED_GRACE_HOURS) {
                Some(NotificationType::DeadlineArrived)
            } else {
                None
            }
        } else if remaining <= Duration::hours(24) {
            Some(NotificationType::TwentyFourHoursLeft)
        } else if remaining <= Duration::hours(48) {
            Some(NotificationType::TwoDaysLeft)
        } else {
            None
        };

        kind.map(|k| (k, remaining))
    }

    /// Classify a task and record the crossing.
    ///
    /// Returns an alert to deliver when the bucket has not fired for this
    /// task before; the store is updated in the same call, so one call per
    /// task per sweep is the contract.
    pub async fn classify(
        task: &Task,
        now: DateTime<Utc>,
        dedup: &dyn DedupStore,
    ) -> Result<Option<DeadlineAlert>, AppError> {
        let Some(deadline) = task.deadline else {
            return Ok(None);
        };
        let Some((kind, remaining)) = Self::bucket(task, now) else {
            return Ok(None);
        };

        if dedup.has_sent(&task.id, kind).await? {
            tracing::debug!(
                task_id = %task.id,
                kind = %kind,
                "Alert suppressed, threshold already delivered for this task"
            );
            return Ok(None);
        }
        dedup.mark_sent(&task.id, kind).await?;

        Ok(Some(DeadlineAlert {
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            task_content: task.content.clone(),
            deadline,
            kind,
            time_remaining: remaining,
        }))
    }
}
