use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use vibesense_core::{JobId, ManualClock, MonitoringJob, NewJob};
use vibesense_queue::shutdown_channel;
use vibesense_scheduler::{
    DynamicScheduler, FetchTrigger, MemorySchedulerStore, SchedulerStore, TriggerError,
};
use vibesense_store::{JobStore, MemoryStore, StoreError};

/// Records every triggered job; optionally refuses with a fixed error.
#[derive(Default)]
struct RecordingTrigger {
    fired: Mutex<Vec<(JobId, DateTime<Utc>)>>,
    refuse: Mutex<Option<TriggerError>>,
    clock: Option<Arc<ManualClock>>,
}

impl RecordingTrigger {
    fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self {
            clock: Some(clock),
            ..Self::default()
        }
    }

    fn count(&self) -> usize {
        self.fired.lock().unwrap().len()
    }

    fn refuse_with(&self, err: Option<TriggerError>) {
        *self.refuse.lock().unwrap() = err;
    }
}

impl FetchTrigger for RecordingTrigger {
    fn trigger(&self, job: &MonitoringJob) -> Result<(), TriggerError> {
        if let Some(err) = self.refuse.lock().unwrap().clone() {
            return Err(err);
        }
        let at = self
            .clock
            .as_ref()
            .map(|c| vibesense_core::Clock::now(c.as_ref()))
            .unwrap_or_else(Utc::now);
        self.fired.lock().unwrap().push((job.job_id, at));
        Ok(())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    jobs: Arc<MemoryStore>,
    timers: Arc<MemorySchedulerStore>,
    trigger: Arc<RecordingTrigger>,
    scheduler: DynamicScheduler,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let jobs = Arc::new(MemoryStore::with_clock(clock.clone()));
    let timers = Arc::new(MemorySchedulerStore::new());
    let trigger = Arc::new(RecordingTrigger::with_clock(clock.clone()));
    let scheduler = DynamicScheduler::new(
        jobs.clone(),
        timers.clone(),
        trigger.clone(),
        clock.clone(),
    );
    Harness {
        clock,
        jobs,
        timers,
        trigger,
        scheduler,
    }
}

fn new_job(interval: f64, duration: f64) -> NewJob {
    NewJob {
        target_id: "video-42".into(),
        interval_seconds: interval,
        total_duration_seconds: duration,
        recipient: "owner@example.com".into(),
        recipient_name: None,
        display_title: "Launch".into(),
    }
}

#[tokio::test]
async fn hourly_job_for_two_hours_fires_exactly_twice() {
    let h = harness();
    let id = h.jobs.create(new_job(3600.0, 7200.0)).await.unwrap();

    let refresh = h.scheduler.refresh().await.unwrap();
    assert_eq!(refresh.admitted, 1);
    assert!(h.jobs.get(id).await.unwrap().is_scheduled);

    // First fire at admission.
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);
    // Nothing more inside the first window.
    h.clock.advance(Duration::seconds(1800));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 0);

    h.clock.set(t0() + Duration::seconds(3600));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);

    h.clock.set(t0() + Duration::seconds(7200));
    let last = h.scheduler.tick().await.unwrap();
    assert_eq!(last.fired, 0);
    assert_eq!(last.evicted, 1);

    h.clock.advance(Duration::hours(5));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 0);

    let fired = h.trigger.fired.lock().unwrap().clone();
    assert_eq!(fired.len(), 2);
    assert!(fired.iter().all(|(_, at)| *at < t0() + Duration::seconds(7200)));
    // History stays queryable after eviction.
    assert!(h.jobs.get(id).await.is_ok());
    assert_eq!(h.timers.len().await.unwrap(), 0);
}

#[tokio::test]
async fn refresh_twice_leaves_one_entry_per_job() {
    let h = harness();
    for _ in 0..3 {
        h.jobs.create(new_job(60.0, 600.0)).await.unwrap();
    }

    let (a, b) = tokio::join!(h.scheduler.refresh(), h.scheduler.refresh());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.admitted + b.admitted, 3);
    assert_eq!(h.timers.len().await.unwrap(), 3);

    let again = h.scheduler.refresh().await.unwrap();
    assert_eq!(again.admitted, 0);
    assert_eq!(h.timers.len().await.unwrap(), 3);
}

#[tokio::test]
async fn expired_job_is_never_admitted_and_stays_unmarked() {
    let h = harness();
    let id = h.jobs.create(new_job(60.0, 120.0)).await.unwrap();
    h.clock.advance(Duration::seconds(120));

    let report = h.scheduler.refresh().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.admitted, 0);
    assert!(!h.jobs.get(id).await.unwrap().is_scheduled);
    assert_eq!(h.timers.len().await.unwrap(), 0);
}

#[tokio::test]
async fn deleted_job_is_evicted_without_firing() {
    let h = harness();
    let id = h.jobs.create(new_job(60.0, 600.0)).await.unwrap();
    h.scheduler.refresh().await.unwrap();
    h.jobs.remove(id).await;

    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(h.trigger.count(), 0);
}

#[tokio::test]
async fn refused_trigger_keeps_entry_and_retries_next_window() {
    let h = harness();
    let id = h.jobs.create(new_job(60.0, 600.0)).await.unwrap();
    h.scheduler.refresh().await.unwrap();

    h.trigger.refuse_with(Some(TriggerError::Saturated));
    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    let entry = h.timers.get(id).await.unwrap().expect("entry kept");
    assert_eq!(entry.next_fire, t0() + Duration::seconds(60));

    // Not retried early.
    h.trigger.refuse_with(None);
    h.clock.advance(Duration::seconds(30));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 0);

    h.clock.advance(Duration::seconds(30));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);
}

#[tokio::test]
async fn in_flight_fetch_skips_window() {
    let h = harness();
    h.jobs.create(new_job(60.0, 600.0)).await.unwrap();
    h.scheduler.refresh().await.unwrap();

    h.trigger
        .refuse_with(Some(TriggerError::InFlight(uuid::Uuid::nil())));
    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn downtime_collapses_missed_windows_into_one_fire() {
    let h = harness();
    let id = h.jobs.create(new_job(60.0, 3600.0)).await.unwrap();
    h.scheduler.refresh().await.unwrap();
    h.scheduler.tick().await.unwrap();

    // Ten minutes of silence.
    h.clock.advance(Duration::seconds(630));
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 1);
    assert_eq!(h.scheduler.tick().await.unwrap().fired, 0);
    assert_eq!(
        h.timers.get(id).await.unwrap().unwrap().next_fire,
        t0() + Duration::seconds(660)
    );
}

#[tokio::test]
async fn two_instances_share_table_without_double_fire() {
    let h = harness();
    let other_trigger = Arc::new(RecordingTrigger::with_clock(h.clock.clone()));
    let other = DynamicScheduler::new(
        h.jobs.clone(),
        h.timers.clone(),
        other_trigger.clone(),
        h.clock.clone(),
    );
    h.jobs.create(new_job(60.0, 600.0)).await.unwrap();

    h.scheduler.refresh().await.unwrap();
    other.refresh().await.unwrap();
    assert_eq!(h.timers.len().await.unwrap(), 1);

    for _ in 0..5 {
        let (a, b) = tokio::join!(h.scheduler.tick(), other.tick());
        a.unwrap();
        b.unwrap();
        h.clock.advance(Duration::seconds(60));
    }
    assert_eq!(h.trigger.count() + other_trigger.count(), 5);
}

#[tokio::test]
async fn reconcile_restores_entries_lost_with_the_table() {
    let h = harness();
    let id = h.jobs.create(new_job(60.0, 600.0)).await.unwrap();
    h.scheduler.refresh().await.unwrap();
    assert!(h.jobs.get(id).await.unwrap().is_scheduled);

    // Simulate a restart with an empty in-memory table.
    let fresh_timers = Arc::new(MemorySchedulerStore::new());
    let restarted = DynamicScheduler::new(
        h.jobs.clone(),
        fresh_timers.clone(),
        h.trigger.clone(),
        h.clock.clone(),
    );
    assert_eq!(restarted.refresh().await.unwrap().admitted, 0);
    assert_eq!(restarted.reconcile().await.unwrap(), 1);
    assert_eq!(restarted.reconcile().await.unwrap(), 0);
    assert_eq!(restarted.tick().await.unwrap().fired, 1);
}

/// Delegates to a memory store but fails `get` for one chosen job.
struct UnreadableJobs {
    inner: Arc<MemoryStore>,
    broken: Mutex<Option<JobId>>,
}

impl UnreadableJobs {
    fn break_job(&self, job_id: Option<JobId>) {
        *self.broken.lock().unwrap() = job_id;
    }
}

#[async_trait]
impl JobStore for UnreadableJobs {
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError> {
        self.inner.create(job).await
    }

    async fn get(&self, job_id: JobId) -> Result<MonitoringJob, StoreError> {
        if *self.broken.lock().unwrap() == Some(job_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.get(job_id).await
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<MonitoringJob>, StoreError> {
        self.inner.list_active(now).await
    }

    async fn list_unscheduled(&self) -> Result<Vec<MonitoringJob>, StoreError> {
        self.inner.list_unscheduled().await
    }

    async fn advance_watermark(
        &self,
        job_id: JobId,
        watermark: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.advance_watermark(job_id, watermark).await
    }

    async fn mark_scheduled(&self, job_id: JobId) -> Result<bool, StoreError> {
        self.inner.mark_scheduled(job_id).await
    }
}

#[tokio::test]
async fn failing_job_lookup_does_not_block_other_jobs() {
    let h = harness();
    let jobs = Arc::new(UnreadableJobs {
        inner: h.jobs.clone(),
        broken: Mutex::new(None),
    });
    let scheduler = DynamicScheduler::new(
        jobs.clone(),
        h.timers.clone(),
        h.trigger.clone(),
        h.clock.clone(),
    );
    let healthy = jobs.create(new_job(60.0, 600.0)).await.unwrap();
    let broken = jobs.create(new_job(60.0, 600.0)).await.unwrap();
    assert_eq!(scheduler.refresh().await.unwrap().admitted, 2);

    jobs.break_job(Some(broken));
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(report.failed, 1);
    let fired: Vec<JobId> = h.trigger.fired.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(fired, vec![healthy]);

    // The broken job's window was never claimed, so it fires once readable.
    let entry = h.timers.get(broken).await.unwrap().expect("entry kept");
    assert_eq!(entry.next_fire, t0());
    jobs.break_job(None);
    assert_eq!(scheduler.tick().await.unwrap().fired, 1);
    assert_eq!(h.trigger.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_fires_after_refresh_and_stops_on_shutdown() {
    let h = harness();
    h.jobs.create(new_job(3600.0, 7200.0)).await.unwrap();
    let scheduler = Arc::new(DynamicScheduler::new(
        h.jobs.clone(),
        h.timers.clone(),
        h.trigger.clone(),
        h.clock.clone(),
    ));

    let (stop, shutdown) = shutdown_channel();
    let handle = tokio::spawn(scheduler.run(
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(1),
        shutdown,
    ));

    // Admitted and fired before the first tick interval elapses.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(h.trigger.count(), 1);

    // A job created later is picked up by the next refresh and fires at once.
    h.jobs.create(new_job(3600.0, 7200.0)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(61)).await;
    assert_eq!(h.trigger.count(), 2);
    assert_eq!(h.timers.len().await.unwrap(), 2);

    stop.trigger();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("scheduler loop exits on shutdown")
        .unwrap();
}
