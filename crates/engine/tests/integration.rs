//! Integration tests for the sweep engine: classification, dedup, fan-out,
//! lifecycle, and cadence, driven through in-memory mocks on a paused clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use herald_common::error::AppError;
use herald_common::types::{AuthorizationState, DeadlineAlert, NotificationType, Task, TaskStatus};
use herald_engine::dedup::MemoryDedupStore;
use herald_engine::scheduler::{IntervalPolicy, Scheduler};
use herald_notifier::DeliveryChannel;
use herald_source::TaskSource;

// ============================================================
// Mocks
// ============================================================

struct StaticSource {
    tasks: Mutex<Vec<Task>>,
    fetch_count: AtomicUsize,
    fail: AtomicBool,
    fetch_delay: Option<StdDuration>,
}

impl StaticSource {
    fn new(tasks: Vec<Task>) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            fetch_count: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            fetch_delay: None,
        })
    }

    fn with_delay(tasks: Vec<Task>, delay: StdDuration) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            fetch_count: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            fetch_delay: Some(delay),
        })
    }

    fn set_tasks(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskSource for StaticSource {
    async fn fetch_active_tasks(&self) -> Result<Vec<Task>, AppError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Fetch("backend unreachable".to_string()));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }
}

struct RecordingChannel {
    channel_name: &'static str,
    enabled: bool,
    authorization: AuthorizationState,
    fail_sends: bool,
    sent: Mutex<Vec<DeadlineAlert>>,
}

impl RecordingChannel {
    fn base(name: &'static str) -> Self {
        Self {
            channel_name: name,
            enabled: true,
            authorization: AuthorizationState::Granted,
            fail_sends: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn granted(name: &'static str) -> Arc<Self> {
        Arc::new(Self::base(name))
    }

    fn denied(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            authorization: AuthorizationState::Denied,
            ..Self::base(name)
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            fail_sends: true,
            ..Self::base(name)
        })
    }

    fn disabled(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            enabled: false,
            ..Self::base(name)
        })
    }

    fn sent(&self) -> Vec<DeadlineAlert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.channel_name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn request_authorization(&self) -> AuthorizationState {
        self.authorization
    }

    async fn send(&self, alert: &DeadlineAlert) -> Result<(), AppError> {
        if self.fail_sends {
            return Err(AppError::ChannelSend {
                channel: self.channel_name.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

fn make_task(id: &str, deadline: Option<chrono::DateTime<Utc>>, status: TaskStatus) -> Task {
    Task {
        id: id.to_string(),
        title: format!("task {}", id),
        content: format!("details for {}", id),
        deadline,
        status,
    }
}

fn build_scheduler(
    source: Arc<StaticSource>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
) -> Scheduler {
    Scheduler::new(
        source,
        channels,
        Arc::new(MemoryDedupStore::new()),
        IntervalPolicy::standard(),
    )
}

// ============================================================
// Start and first sweep
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_start_runs_immediate_sweep_on_all_channels() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(36)),
        TaskStatus::Open,
    )]);
    let first = RecordingChannel::granted("first");
    let second = RecordingChannel::granted("second");
    let scheduler = build_scheduler(
        source.clone(),
        vec![first.clone() as Arc<dyn DeliveryChannel>, second.clone()],
    );

    scheduler.start().await.unwrap();

    assert_eq!(source.fetches(), 1);
    for channel in [&first, &second] {
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationType::TwoDaysLeft);
        assert_eq!(sent[0].task_id, "1");
    }

    let status = scheduler.status();
    assert!(status.is_running);
    assert!(status.is_enabled);
    assert!(status.last_check_at.is_some());
    assert!(status.next_check_in_ms.is_some());

    scheduler.stop();
    let status = scheduler.status();
    assert!(!status.is_running);
    assert!(status.next_check_in_ms.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_noop() {
    let source = StaticSource::new(vec![]);
    let scheduler = build_scheduler(source.clone(), vec![RecordingChannel::granted("local")]);

    scheduler.start().await.unwrap();
    scheduler.start().await.unwrap();

    // One immediate sweep, not two
    assert_eq!(source.fetches(), 1);
    scheduler.stop();
}

// ============================================================
// Dedup across sweeps
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_periodic_sweeps_never_duplicate_an_alert() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(36)),
        TaskStatus::Open,
    )]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    scheduler.start().await.unwrap();
    // Let the timer fire twice more
    tokio::time::sleep(StdDuration::from_secs(601)).await;

    assert!(source.fetches() >= 3);
    assert_eq!(channel.sent().len(), 1);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_each_threshold_fires_separately() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(25)),
        TaskStatus::Open,
    )]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(channel.sent()[0].kind, NotificationType::TwoDaysLeft);

    // The deadline moves inside the next threshold
    source.set_tasks(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(23)),
        TaskStatus::Open,
    )]);
    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(channel.sent().len(), 2);
    assert_eq!(channel.sent()[1].kind, NotificationType::TwentyFourHoursLeft);

    // Same threshold again stays quiet
    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 0);
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_rearms_suppressed_alerts() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(12)),
        TaskStatus::Open,
    )]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    assert_eq!(scheduler.check_now().await.alerts_dispatched, 1);
    assert_eq!(scheduler.check_now().await.alerts_dispatched, 0);

    scheduler.reset_all_notifications().await.unwrap();

    assert_eq!(scheduler.check_now().await.alerts_dispatched, 1);
    assert_eq!(scheduler.check_now().await.alerts_dispatched, 0);
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_single_task_leaves_others_suppressed() {
    let now = Utc::now();
    let source = StaticSource::new(vec![
        make_task("1", Some(now + Duration::hours(12)), TaskStatus::Open),
        make_task("2", Some(now + Duration::hours(12)), TaskStatus::Open),
    ]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    assert_eq!(scheduler.check_now().await.alerts_dispatched, 2);

    scheduler.reset_task_notifications("1").await.unwrap();

    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(channel.sent().last().unwrap().task_id, "1");
}

// ============================================================
// Classification edge cases through the full pipeline
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_done_and_undated_tasks_never_alert() {
    let now = Utc::now();
    let source = StaticSource::new(vec![
        make_task("1", Some(now + Duration::hours(12)), TaskStatus::Done),
        make_task("2", None, TaskStatus::Open),
    ]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    let report = scheduler.check_now().await;
    assert_eq!(report.tasks_checked, 2);
    assert_eq!(report.alerts_dispatched, 0);
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_overdue_task_alerts_inside_grace_window_only() {
    let now = Utc::now();
    let source = StaticSource::new(vec![
        make_task("1", Some(now - Duration::minutes(30)), TaskStatus::Open),
        make_task("2", Some(now - Duration::hours(2)), TaskStatus::Open),
    ]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 1);
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].task_id, "1");
    assert_eq!(sent[0].kind, NotificationType::DeadlineArrived);
}

// ============================================================
// Cadence
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_report_tightens_cadence_near_deadline() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::minutes(90)),
        TaskStatus::Open,
    )]);
    let scheduler = build_scheduler(source, vec![RecordingChannel::granted("local")]);

    let report = scheduler.check_now().await;
    assert_eq!(report.next_delay_ms, 60_000);
}

#[tokio::test(start_paused = true)]
async fn test_report_uses_default_cadence_when_nothing_is_close() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(30)),
        TaskStatus::Open,
    )]);
    let scheduler = build_scheduler(source, vec![RecordingChannel::granted("local")]);

    let report = scheduler.check_now().await;
    assert_eq!(report.next_delay_ms, 300_000);
}

// ============================================================
// Failure handling
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_keeps_scheduler_alive() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(12)),
        TaskStatus::Open,
    )]);
    source.set_fail(true);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source.clone(), vec![channel.clone()]);

    scheduler.start().await.unwrap();

    let status = scheduler.status();
    assert!(status.is_running);
    // A failed sweep does not count as a completed check
    assert!(status.last_check_at.is_none());
    assert!(channel.sent().is_empty());

    // Backend recovers before the next tick
    source.set_fail(false);
    tokio::time::sleep(StdDuration::from_secs(301)).await;

    assert_eq!(channel.sent().len(), 1);
    assert!(scheduler.status().last_check_at.is_some());
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_channel_failure_does_not_block_other_deliveries() {
    let now = Utc::now();
    let source = StaticSource::new(vec![
        make_task("1", Some(now + Duration::hours(36)), TaskStatus::Open),
        make_task("2", Some(now + Duration::hours(12)), TaskStatus::Open),
    ]);
    let broken = RecordingChannel::failing("broken");
    let healthy = RecordingChannel::granted("healthy");
    let scheduler = build_scheduler(
        source,
        vec![broken.clone() as Arc<dyn DeliveryChannel>, healthy.clone()],
    );

    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 2);
    assert_eq!(healthy.sent().len(), 2);
    assert!(broken.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_channel_receives_nothing() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(12)),
        TaskStatus::Open,
    )]);
    let active = RecordingChannel::granted("active");
    let dormant = RecordingChannel::disabled("dormant");
    let scheduler = build_scheduler(
        source,
        vec![active.clone() as Arc<dyn DeliveryChannel>, dormant.clone()],
    );

    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(active.sent().len(), 1);
    assert!(dormant.sent().is_empty());
}

// ============================================================
// Lifecycle
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_denied_authorization_blocks_start() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(12)),
        TaskStatus::Open,
    )]);
    let granted = RecordingChannel::granted("granted");
    let denied = RecordingChannel::denied("denied");
    let scheduler = build_scheduler(
        source.clone(),
        vec![granted.clone() as Arc<dyn DeliveryChannel>, denied],
    );

    let result = scheduler.start().await;
    assert!(matches!(result, Err(AppError::AuthorizationDenied(_))));

    // No sweep ran and the scheduler stays stopped
    assert_eq!(source.fetches(), 0);
    assert!(!scheduler.status().is_running);
    assert!(granted.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_inflight_sweep_prevents_rearm() {
    let source = StaticSource::with_delay(
        vec![make_task(
            "1",
            Some(Utc::now() + Duration::hours(12)),
            TaskStatus::Open,
        )],
        StdDuration::from_secs(10),
    );
    let scheduler = build_scheduler(source.clone(), vec![RecordingChannel::granted("local")]);

    let starter = scheduler.clone();
    let handle = tokio::spawn(async move { starter.start().await });
    // Let the first sweep enter its fetch
    tokio::task::yield_now().await;
    assert_eq!(source.fetches(), 1);

    scheduler.stop();
    handle.await.unwrap().unwrap();

    // The in-flight sweep finished but nothing was re-armed
    tokio::time::sleep(StdDuration::from_secs(3600)).await;
    assert_eq!(source.fetches(), 1);
    assert!(!scheduler.status().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_coalesce() {
    let source = StaticSource::with_delay(
        vec![make_task(
            "1",
            Some(Utc::now() + Duration::hours(12)),
            TaskStatus::Open,
        )],
        StdDuration::from_secs(5),
    );
    let scheduler = build_scheduler(source.clone(), vec![RecordingChannel::granted("local")]);

    let first = scheduler.clone();
    let handle = tokio::spawn(async move { first.check_now().await });
    tokio::task::yield_now().await;

    // Second trigger lands while the first sweep is still fetching
    let second = scheduler.check_now().await;
    assert!(second.skipped);
    assert_eq!(second.alerts_dispatched, 0);

    let first_report = handle.await.unwrap();
    assert!(!first_report.skipped);
    assert_eq!(first_report.alerts_dispatched, 1);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_check_works_while_stopped() {
    let source = StaticSource::new(vec![make_task(
        "1",
        Some(Utc::now() + Duration::hours(12)),
        TaskStatus::Open,
    )]);
    let channel = RecordingChannel::granted("local");
    let scheduler = build_scheduler(source, vec![channel.clone()]);

    let report = scheduler.check_now().await;
    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(channel.sent().len(), 1);

    let status = scheduler.status();
    assert!(!status.is_running);
    assert!(status.last_check_at.is_some());
}
