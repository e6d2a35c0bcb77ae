//! Check scheduler: drives periodic deadline sweeps.
//!
//! The scheduler owns the task source, the delivery channels, and the dedup
//! store. A sweep fetches active tasks, classifies each one, and fans alerts
//! out to every enabled channel. Between sweeps a timer task sleeps for an
//! interval chosen from the last result set: when any open task is close to
//! its deadline the schedule tightens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;

use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::{AuthorizationState, Task};
use herald_notifier::DeliveryChannel;
use herald_source::TaskSource;

use crate::analyzer::DeadlineAnalyzer;
use crate::dedup::DedupStore;

const DEFAULT_INTERVAL_SECS: u64 = 300;
const URGENT_INTERVAL_SECS: u64 = 60;
const URGENT_WINDOW_MINUTES: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    Starting,
    Running,
}

/// Sweep cadence rules.
#[derive(Debug, Clone)]
pub struct IntervalPolicy {
    /// Delay between sweeps when nothing is close to its deadline.
    pub default_interval: StdDuration,
    /// Delay between sweeps while some deadline is inside the urgent window.
    pub urgent_interval: StdDuration,
    /// How close a deadline must be to tighten the schedule.
    pub urgent_window: Duration,
}

impl IntervalPolicy {
    pub fn new(
        default_interval: StdDuration,
        urgent_interval: StdDuration,
        urgent_window: Duration,
    ) -> Self {
        Self {
            default_interval,
            urgent_interval,
            urgent_window,
        }
    }

    /// 5-minute sweeps, tightening to 1 minute inside the last 2 hours.
    pub fn standard() -> Self {
        Self::new(
            StdDuration::from_secs(DEFAULT_INTERVAL_SECS),
            StdDuration::from_secs(URGENT_INTERVAL_SECS),
            Duration::minutes(URGENT_WINDOW_MINUTES),
        )
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            StdDuration::from_secs(config.check_interval_secs),
            StdDuration::from_secs(config.urgent_check_interval_secs),
            Duration::minutes(config.urgent_window_minutes as i64),
        )
    }

    /// Pick the delay until the next sweep from the current task set.
    ///
    /// Only open tasks strictly before their deadline count; an overdue task
    /// has nothing left to anticipate.
    pub fn next_delay(&self, tasks: &[Task], now: DateTime<Utc>) -> StdDuration {
        let urgent = tasks.iter().any(|task| {
            task.is_open()
                && task.deadline.is_some_and(|deadline| {
                    let remaining = deadline - now;
                    remaining > Duration::zero() && remaining <= self.urgent_window
                })
        });
        if urgent {
            self.urgent_interval
        } else {
            self.default_interval
        }
    }
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of one sweep, returned from manual checks and used by the timer
/// to pick its next delay.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tasks_checked: usize,
    pub alerts_dispatched: usize,
    pub fetch_failed: bool,
    /// True when the trigger was dropped because a sweep was already running.
    pub skipped: bool,
    pub next_delay_ms: u64,
}

/// Snapshot of scheduler state for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub is_enabled: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub next_check_in_ms: Option<i64>,
}

struct SchedulerInner {
    source: Arc<dyn TaskSource>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    dedup: Arc<dyn DedupStore>,
    policy: IntervalPolicy,
    lifecycle: Mutex<Lifecycle>,
    in_flight: AtomicBool,
    last_check_at: Mutex<Option<DateTime<Utc>>>,
    next_check_at: Mutex<Option<DateTime<Utc>>>,
    timer: Mutex<Option<watch::Sender<bool>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to the sweep engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn TaskSource>,
        channels: Vec<Arc<dyn DeliveryChannel>>,
        dedup: Arc<dyn DedupStore>,
        policy: IntervalPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                source,
                channels,
                dedup,
                policy,
                lifecycle: Mutex::new(Lifecycle::Stopped),
                in_flight: AtomicBool::new(false),
                last_check_at: Mutex::new(None),
                next_check_at: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Start periodic sweeps.
    ///
    /// Every channel must answer its authorization probe with something other
    /// than denied, otherwise the scheduler stays stopped. On success the
    /// first sweep runs before this call returns, then the timer takes over.
    /// Calling start on a scheduler that is not stopped is a no-op.
    pub async fn start(&self) -> Result<(), AppError> {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if *lifecycle != Lifecycle::Stopped {
                return Ok(());
            }
            *lifecycle = Lifecycle::Starting;
        }

        for channel in &self.inner.channels {
            if channel.request_authorization().await == AuthorizationState::Denied {
                self.set_lifecycle(Lifecycle::Stopped);
                return Err(AppError::AuthorizationDenied(channel.name().to_string()));
            }
        }

        self.set_lifecycle(Lifecycle::Running);
        tracing::info!(
            default_interval_secs = self.inner.policy.default_interval.as_secs(),
            urgent_interval_secs = self.inner.policy.urgent_interval.as_secs(),
            "Scheduler started"
        );

        let report = self.run_tick().await;

        // A stop that raced the first sweep wins; leave the timer unarmed
        if self.lifecycle() == Lifecycle::Running {
            self.arm_timer(StdDuration::from_millis(report.next_delay_ms));
        }
        Ok(())
    }

    /// Stop periodic sweeps.
    ///
    /// Cancels the pending timer immediately. A sweep already in flight
    /// finishes on its own but will not re-arm.
    pub fn stop(&self) {
        let was_active = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            let active = *lifecycle != Lifecycle::Stopped;
            *lifecycle = Lifecycle::Stopped;
            active
        };
        if let Some(sender) = lock(&self.inner.timer).take() {
            let _ = sender.send(true);
        }
        *lock(&self.inner.next_check_at) = None;
        if was_active {
            tracing::info!("Scheduler stopped");
        }
    }

    /// Run one sweep immediately, regardless of lifecycle state.
    ///
    /// The periodic schedule is not disturbed. If a sweep is already in
    /// flight the trigger is dropped and the report says so.
    pub async fn check_now(&self) -> TickReport {
        self.run_tick().await
    }

    pub fn status(&self) -> SchedulerStatus {
        let is_running = self.lifecycle() == Lifecycle::Running;
        let last_check_at = *lock(&self.inner.last_check_at);
        let next_check_at = *lock(&self.inner.next_check_at);
        let next_check_in_ms = if is_running {
            next_check_at.map(|at| (at - Utc::now()).num_milliseconds().max(0))
        } else {
            None
        };
        SchedulerStatus {
            is_running,
            is_enabled: self.inner.channels.iter().any(|c| c.is_enabled()),
            last_check_at,
            next_check_in_ms,
        }
    }

    /// Forget delivered thresholds for one task.
    pub async fn reset_task_notifications(&self, task_id: &str) -> Result<(), AppError> {
        self.inner.dedup.reset_task(task_id).await?;
        tracing::info!(task_id = %task_id, "Notification history reset for task");
        Ok(())
    }

    /// Forget all delivered thresholds.
    pub async fn reset_all_notifications(&self) -> Result<(), AppError> {
        self.inner.dedup.reset_all().await?;
        tracing::info!("Notification history reset");
        Ok(())
    }

    fn lifecycle(&self) -> Lifecycle {
        *lock(&self.inner.lifecycle)
    }

    fn set_lifecycle(&self, state: Lifecycle) {
        *lock(&self.inner.lifecycle) = state;
    }

    fn set_next_check(&self, delay: StdDuration) {
        let at = Utc::now() + Duration::milliseconds(delay.as_millis() as i64);
        *lock(&self.inner.next_check_at) = Some(at);
    }

    /// Spawn the timer task. Replacing the stored sender drops the previous
    /// one, which wakes and terminates any earlier timer task.
    fn arm_timer(&self, first_delay: StdDuration) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *lock(&self.inner.timer) = Some(shutdown_tx);
        self.set_next_check(first_delay);

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if scheduler.lifecycle() != Lifecycle::Running {
                    break;
                }
                let report = scheduler.run_tick().await;
                if scheduler.lifecycle() != Lifecycle::Running {
                    break;
                }
                delay = StdDuration::from_millis(report.next_delay_ms);
                scheduler.set_next_check(delay);
            }
        });
    }

    /// Run one sweep unless another is already in flight.
    async fn run_tick(&self) -> TickReport {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sweep already in progress, coalescing trigger");
            return TickReport {
                tasks_checked: 0,
                alerts_dispatched: 0,
                fetch_failed: false,
                skipped: true,
                next_delay_ms: self.inner.policy.default_interval.as_millis() as u64,
            };
        }
        let report = self.sweep().await;
        self.inner.in_flight.store(false, Ordering::SeqCst);
        report
    }

    /// Fetch, classify, and deliver. Never returns an error: a failed fetch
    /// is reported and retried on the next tick, a failed channel is logged
    /// and skipped.
    async fn sweep(&self) -> TickReport {
        let now = Utc::now();
        let tasks = match self.inner.source.fetch_active_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "Task fetch failed, retrying at the default interval");
                return TickReport {
                    tasks_checked: 0,
                    alerts_dispatched: 0,
                    fetch_failed: true,
                    skipped: false,
                    next_delay_ms: self.inner.policy.default_interval.as_millis() as u64,
                };
            }
        };

        let mut alerts_dispatched = 0;
        for task in &tasks {
            let alert = match DeadlineAnalyzer::classify(task, now, self.inner.dedup.as_ref()).await
            {
                Ok(Some(alert)) => alert,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(task_id = %task.id, error = %e, "Classification failed, skipping task");
                    continue;
                }
            };

            tracing::info!(
                task_id = %alert.task_id,
                kind = %alert.kind,
                minutes_remaining = alert.time_remaining.num_minutes(),
                "Deadline alert triggered"
            );
            for channel in &self.inner.channels {
                if !channel.is_enabled() {
                    continue;
                }
                if let Err(e) = channel.send(&alert).await {
                    tracing::warn!(
                        channel = channel.name(),
                        error = %e,
                        "Delivery failed on one channel, continuing"
                    );
                }
            }
            alerts_dispatched += 1;
        }

        *lock(&self.inner.last_check_at) = Some(now);
        let next_delay = self.inner.policy.next_delay(&tasks, now);
        TickReport {
            tasks_checked: tasks.len(),
            alerts_dispatched,
            fetch_failed: false,
            skipped: false,
            next_delay_ms: next_delay.as_millis() as u64,
        }
    }
}
