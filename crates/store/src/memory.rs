//! In-process store used by tests and single-node runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use vibesense_core::{Clock, IntervalResult, JobId, MonitoringJob, NewJob, SystemClock};

use crate::error::StoreError;
use crate::traits::{JobStore, ResultStore};

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    jobs: RwLock<HashMap<JobId, MonitoringJob>>,
    results: RwLock<HashMap<JobId, Vec<IntervalResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a fully-formed job as-is, replacing any job with the same id.
    pub async fn insert(&self, job: MonitoringJob) {
        self.jobs.write().await.insert(job.job_id, job);
    }

    /// Remove a job record, simulating a deletion behind the scheduler's back.
    pub async fn remove(&self, job_id: JobId) -> Option<MonitoringJob> {
        self.jobs.write().await.remove(&job_id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError> {
        let job = job.into_job(self.clock.now())?;
        let id = job.job_id;
        self.jobs.write().await.insert(id, job);
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<MonitoringJob, StoreError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<MonitoringJob>, StoreError> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| !j.is_expired(now))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn list_unscheduled(&self) -> Result<Vec<MonitoringJob>, StoreError> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| !j.is_scheduled)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn advance_watermark(
        &self,
        job_id: JobId,
        watermark: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        match job.watermark {
            Some(current) if watermark < current => Err(StoreError::StaleWatermark {
                job_id,
                current,
                proposed: watermark,
            }),
            _ => {
                job.watermark = Some(watermark);
                Ok(())
            }
        }
    }

    async fn mark_scheduled(&self, job_id: JobId) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        let changed = !job.is_scheduled;
        job.is_scheduled = true;
        Ok(changed)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn record_interval(&self, result: IntervalResult) -> Result<IntervalResult, StoreError> {
        let mut results = self.results.write().await;
        let rows = results.entry(result.job_id).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| r.batch_key == result.batch_key) {
            let id = existing.id;
            *existing = IntervalResult { id, ..result };
            return Ok(existing.clone());
        }
        rows.push(result.clone());
        Ok(result)
    }

    async fn history(&self, job_id: JobId) -> Result<Vec<IntervalResult>, StoreError> {
        let mut rows = self
            .results
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }
}
