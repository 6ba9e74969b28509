use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vibesense_core::{IntervalResult, JobId, MonitoringJob, NewJob};

use crate::error::StoreError;

/// Durable record of monitoring jobs and their scheduling state.
///
/// `advance_watermark` and `mark_scheduled` are conditional updates, so
/// several scheduler or dispatch instances may share one store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Validate and persist a new job. `created_at` comes from the store's clock.
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError>;

    async fn get(&self, job_id: JobId) -> Result<MonitoringJob, StoreError>;

    /// Jobs whose expiration instant is strictly after `now`.
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<MonitoringJob>, StoreError>;

    /// Jobs not yet claimed by a scheduler, expired or not.
    async fn list_unscheduled(&self) -> Result<Vec<MonitoringJob>, StoreError>;

    /// Move the watermark forward to `watermark`.
    ///
    /// An equal value is accepted as a no-op; a lesser value fails with
    /// [`StoreError::StaleWatermark`] and leaves the record unchanged.
    async fn advance_watermark(
        &self,
        job_id: JobId,
        watermark: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Set `is_scheduled`. Returns `false` when it was already set.
    async fn mark_scheduled(&self, job_id: JobId) -> Result<bool, StoreError>;
}

/// Append-mostly history of per-batch statistics.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert, or overwrite the row with the same `(job_id, batch_key)`.
    /// Returns the stored row, whose `id` is that of the first insert.
    async fn record_interval(&self, result: IntervalResult) -> Result<IntervalResult, StoreError>;

    /// All interval results for `job_id`, oldest first.
    async fn history(&self, job_id: JobId) -> Result<Vec<IntervalResult>, StoreError>;
}
