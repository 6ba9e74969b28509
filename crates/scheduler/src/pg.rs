//! PostgreSQL timer table (`schedule_entries`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vibesense_core::JobId;

use crate::entry::TimerEntry;
use crate::error::SchedulerError;
use crate::store::SchedulerStore;

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    job_id: Uuid,
    next_fire: DateTime<Utc>,
    interval_seconds: f64,
}

impl From<EntryRow> for TimerEntry {
    fn from(row: EntryRow) -> Self {
        TimerEntry::new(row.job_id, row.next_fire, row.interval_seconds)
    }
}

#[derive(Clone)]
pub struct PgSchedulerStore {
    pool: PgPool,
}

impl PgSchedulerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchedulerStore for PgSchedulerStore {
    async fn admit(&self, entry: TimerEntry) -> Result<bool, SchedulerError> {
        let result = sqlx::query(
            "INSERT INTO schedule_entries (job_id, next_fire, interval_seconds)
             VALUES ($1, $2, $3)
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(entry.job_id)
        .bind(entry.next_fire)
        .bind(entry.interval_seconds)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn evict(&self, job_id: JobId) -> Result<bool, SchedulerError> {
        let result = sqlx::query("DELETE FROM schedule_entries WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<TimerEntry>, SchedulerError> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT job_id, next_fire, interval_seconds FROM schedule_entries
             WHERE next_fire <= $1
             ORDER BY next_fire",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TimerEntry::from).collect())
    }

    async fn claim_fire(
        &self,
        job_id: JobId,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let result = sqlx::query(
            "UPDATE schedule_entries SET next_fire = $3 WHERE job_id = $1 AND next_fire = $2",
        )
        .bind(job_id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<TimerEntry>, SchedulerError> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT job_id, next_fire, interval_seconds FROM schedule_entries WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TimerEntry::from))
    }

    async fn len(&self) -> Result<usize, SchedulerError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM schedule_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
