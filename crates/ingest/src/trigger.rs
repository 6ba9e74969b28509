//! Fetch trigger that spawns a dispatch task per fire.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, warn};
use vibesense_core::{Classify, JobId, MonitoringJob};
use vibesense_scheduler::{FetchTrigger, TriggerError};

use crate::dispatch::{DispatchOutcome, FetchDispatcher};

/// Bounded-concurrency trigger with at most one run per job in flight.
pub struct SpawnTrigger {
    dispatcher: Arc<FetchDispatcher>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    in_flight: Arc<Mutex<HashSet<JobId>>>,
}

/// Clears the job's in-flight mark when the task ends, however it ends.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<JobId>>>,
    job_id: JobId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}

impl SpawnTrigger {
    pub fn new(dispatcher: Arc<FetchDispatcher>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            dispatcher,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Stop accepting fires and wait up to `timeout` for running dispatches.
    /// Returns `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let all = u32::try_from(self.max_concurrency).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(timeout, self.permits.acquire_many(all)).await;
        self.permits.close();
        matches!(drained, Ok(Ok(_)))
    }
}

impl FetchTrigger for SpawnTrigger {
    fn trigger(&self, job: &MonitoringJob) -> Result<(), TriggerError> {
        let job_id = job.job_id;
        {
            let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if set.contains(&job_id) {
                return Err(TriggerError::InFlight(job_id));
            }
            let permit = match self.permits.clone().try_acquire_owned() {
                Ok(p) => p,
                Err(TryAcquireError::NoPermits) => return Err(TriggerError::Saturated),
                Err(TryAcquireError::Closed) => return Err(TriggerError::Closed),
            };
            set.insert(job_id);

            let guard = InFlightGuard {
                set: self.in_flight.clone(),
                job_id,
            };
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                match dispatcher.run(job_id).await {
                    Ok(DispatchOutcome::Dispatched { .. }) => {}
                    Ok(outcome) => debug!(job_id = %job_id, ?outcome, "Dispatch finished"),
                    Err(e) => warn!(
                        job_id = %job_id,
                        error = %e,
                        kind = %e.kind(),
                        "Dispatch failed, retrying next window"
                    ),
                }
            });
        }
        Ok(())
    }
}
