//! [`DynamicScheduler`]: admits jobs into the timer table and fires them.
//!
//! Two passes drive it:
//!
//! - **refresh** discovers unscheduled jobs and admits them with a first
//!   fire at admission time
//! - **tick** fires every due entry after re-validating the job against the
//!   job store, and evicts jobs that are gone or expired
//!
//! [`run`](DynamicScheduler::run) loops both passes until shutdown. Errors
//! inside a pass are logged per job and never stop the loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vibesense_core::{Clock, MonitoringJob};
use vibesense_queue::Shutdown;
use vibesense_store::{JobStore, StoreError};

use crate::entry::TimerEntry;
use crate::error::{SchedulerError, TriggerError};
use crate::store::SchedulerStore;
use crate::trigger::FetchTrigger;

// ── Reports ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub admitted: usize,
    /// Already had a timer entry (another pass or instance got there first).
    pub already_admitted: usize,
    /// Expired before admission; left unmarked.
    pub expired: usize,
    pub failed: usize,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "admitted={} already={} expired={} failed={}",
            self.admitted, self.already_admitted, self.expired, self.failed
        )
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub fired: usize,
    pub evicted: usize,
    /// Window claimed by another instance, or a fetch still in flight.
    pub skipped: usize,
    /// Trigger refused or job lookup failed; the entry is kept.
    pub failed: usize,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fired={} evicted={} skipped={} failed={}",
            self.fired, self.evicted, self.skipped, self.failed
        )
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

pub struct DynamicScheduler {
    jobs: Arc<dyn JobStore>,
    timers: Arc<dyn SchedulerStore>,
    trigger: Arc<dyn FetchTrigger>,
    clock: Arc<dyn Clock>,
}

impl DynamicScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        timers: Arc<dyn SchedulerStore>,
        trigger: Arc<dyn FetchTrigger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            timers,
            trigger,
            clock,
        }
    }

    /// Admit every unscheduled, unexpired job with `next_fire = now`.
    ///
    /// Admission is insert-if-absent, so running refresh twice, or on two
    /// instances, leaves one entry per job.
    pub async fn refresh(&self) -> Result<RefreshReport, SchedulerError> {
        let now = self.clock.now();
        let mut report = RefreshReport::default();

        for job in self.jobs.list_unscheduled().await? {
            if job.is_expired(now) {
                debug!(job_id = %job.job_id, "Skipping expired job at admission");
                report.expired += 1;
                continue;
            }

            match self.admit(&job, now).await {
                Ok(true) => report.admitted += 1,
                Ok(false) => report.already_admitted += 1,
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "Failed to admit job");
                    report.failed += 1;
                    continue;
                }
            }

            // A failed mark leaves the job listed as unscheduled; the next
            // refresh re-admits (no-op) and retries the mark.
            if let Err(e) = self.jobs.mark_scheduled(job.job_id).await {
                warn!(job_id = %job.job_id, error = %e, "Failed to mark job scheduled");
            }
        }

        Ok(report)
    }

    /// Re-admit active jobs that have no timer entry.
    ///
    /// Needed after a restart with a non-durable timer table, where jobs are
    /// already marked scheduled and refresh would never see them again.
    pub async fn reconcile(&self) -> Result<usize, SchedulerError> {
        let now = self.clock.now();
        let mut restored = 0;

        for job in self.jobs.list_active(now).await? {
            match self.admit(&job, now).await {
                Ok(true) => {
                    restored += 1;
                    if !job.is_scheduled {
                        if let Err(e) = self.jobs.mark_scheduled(job.job_id).await {
                            warn!(job_id = %job.job_id, error = %e, "Failed to mark job scheduled");
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(job_id = %job.job_id, error = %e, "Failed to restore timer entry"),
            }
        }

        Ok(restored)
    }

    async fn admit(&self, job: &MonitoringJob, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let admitted = self
            .timers
            .admit(TimerEntry::new(job.job_id, now, job.interval_seconds))
            .await?;
        if admitted {
            info!(
                job_id = %job.job_id,
                target = %job.target_id,
                interval_secs = job.interval_seconds,
                expires_at = %job.expires_at(),
                "Job admitted"
            );
        }
        Ok(admitted)
    }

    /// Fire every due entry once.
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        let now = self.clock.now();
        let mut report = TickReport::default();

        for entry in self.timers.due(now).await? {
            let job_id = entry.job_id;

            // Always decide expiry from durable state.
            let job = match self.jobs.get(job_id).await {
                Ok(job) => job,
                Err(StoreError::NotFound(_)) => {
                    info!(job_id = %job_id, "Job no longer exists, evicting");
                    self.evict(&entry, &mut report).await;
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Failed to load job for tick");
                    report.failed += 1;
                    continue;
                }
            };

            if job.is_expired(now) {
                info!(job_id = %job_id, expired_at = %job.expires_at(), "Job expired, evicting");
                self.evict(&entry, &mut report).await;
                continue;
            }

            let next = entry.following_fire(job.interval(), now);
            match self.timers.claim_fire(job_id, entry.next_fire, next).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(job_id = %job_id, "Window already claimed");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Failed to claim fire window");
                    report.failed += 1;
                    continue;
                }
            }

            // The cadence advances regardless of what the trigger says.
            match self.trigger.trigger(&job) {
                Ok(()) => {
                    debug!(job_id = %job_id, next_fire = %next, "Fetch triggered");
                    report.fired += 1;
                }
                Err(TriggerError::InFlight(_)) => {
                    debug!(job_id = %job_id, "Previous fetch still running, skipping window");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, next_fire = %next, "Failed to trigger fetch");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn evict(&self, entry: &TimerEntry, report: &mut TickReport) {
        match self.timers.evict(entry.job_id).await {
            Ok(_) => report.evicted += 1,
            Err(e) => {
                warn!(job_id = %entry.job_id, error = %e, "Failed to evict timer entry");
                report.failed += 1;
            }
        }
    }

    /// Reconcile once, then run refresh and tick on their cadences until
    /// shutdown. Each refresh is followed by a tick so new jobs fire at once.
    pub async fn run(
        self: Arc<Self>,
        refresh_every: Duration,
        tick_every: Duration,
        mut shutdown: Shutdown,
    ) {
        match self.reconcile().await {
            Ok(0) => {}
            Ok(n) => info!(restored = n, "Restored timer entries for active jobs"),
            Err(e) => warn!(error = %e, "Reconcile failed"),
        }

        info!(
            refresh_secs = refresh_every.as_secs(),
            tick_secs = tick_every.as_secs(),
            "Scheduler started"
        );

        let mut refresh = tokio::time::interval(refresh_every);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick = tokio::time::interval(tick_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    match self.refresh().await {
                        Ok(r) if r.admitted > 0 || r.failed > 0 => info!(report = %r, "Refresh pass"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Refresh pass failed"),
                    }
                    self.logged_tick().await;
                }
                _ = tick.tick() => self.logged_tick().await,
                _ = shutdown.wait() => break,
            }
        }

        info!("Scheduler stopped");
    }

    async fn logged_tick(&self) {
        match self.tick().await {
            Ok(r) if r.fired > 0 || r.evicted > 0 || r.failed > 0 => info!(report = %r, "Tick pass"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Tick pass failed"),
        }
    }
}
