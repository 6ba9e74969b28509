//! PostgreSQL-backed job and result store.
//!
//! Watermark and scheduling flags are written with conditional `UPDATE`s so
//! the row itself arbitrates between concurrent writers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;
use vibesense_core::{Clock, IntervalResult, JobId, MonitoringJob, NewJob, SystemClock};

use crate::error::StoreError;
use crate::traits::{JobStore, ResultStore};

const JOB_COLUMNS: &str = "job_id, target_id, interval_seconds, total_duration_seconds, \
     created_at, watermark, is_scheduled, recipient, recipient_name, display_title";

const RESULT_COLUMNS: &str =
    "id, job_id, batch_key, interval_ts, avg_sentiment, avg_confidence, comment_count, summary";

// ── Row mapping ──────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub job_id: Uuid,
    pub target_id: String,
    pub interval_seconds: f64,
    pub total_duration_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub watermark: Option<DateTime<Utc>>,
    pub is_scheduled: bool,
    pub recipient: String,
    pub recipient_name: Option<String>,
    pub display_title: String,
}

impl From<JobRow> for MonitoringJob {
    fn from(row: JobRow) -> Self {
        MonitoringJob {
            job_id: row.job_id,
            target_id: row.target_id,
            interval_seconds: row.interval_seconds,
            total_duration_seconds: row.total_duration_seconds,
            created_at: row.created_at,
            watermark: row.watermark,
            is_scheduled: row.is_scheduled,
            recipient: row.recipient,
            recipient_name: row.recipient_name,
            display_title: row.display_title,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct IntervalRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub batch_key: String,
    pub interval_ts: DateTime<Utc>,
    pub avg_sentiment: f64,
    pub avg_confidence: f64,
    pub comment_count: i64,
    pub summary: Option<String>,
}

impl From<IntervalRow> for IntervalResult {
    fn from(row: IntervalRow) -> Self {
        IntervalResult {
            id: row.id,
            job_id: row.job_id,
            batch_key: row.batch_key,
            timestamp: row.interval_ts,
            avg_sentiment: row.avg_sentiment,
            avg_confidence: row.avg_confidence,
            comment_count: row.comment_count,
            summary: row.summary,
        }
    }
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_watermark(
        &self,
        job_id: JobId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT watermark FROM monitoring_jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(job_id))
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create(&self, job: NewJob) -> Result<JobId, StoreError> {
        let job = job.into_job(self.clock.now())?;
        sqlx::query(
            "INSERT INTO monitoring_jobs
                 (job_id, target_id, interval_seconds, total_duration_seconds, created_at,
                  watermark, is_scheduled, recipient, recipient_name, display_title)
             VALUES ($1, $2, $3, $4, $5, NULL, FALSE, $6, $7, $8)",
        )
        .bind(job.job_id)
        .bind(&job.target_id)
        .bind(job.interval_seconds)
        .bind(job.total_duration_seconds)
        .bind(job.created_at)
        .bind(&job.recipient)
        .bind(&job.recipient_name)
        .bind(&job.display_title)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.job_id, target = %job.target_id, "Monitoring job created");
        Ok(job.job_id)
    }

    async fn get(&self, job_id: JobId) -> Result<MonitoringJob, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM monitoring_jobs WHERE job_id = $1");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .map(MonitoringJob::from)
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<MonitoringJob>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM monitoring_jobs
             WHERE created_at + make_interval(secs => total_duration_seconds) > $1
             ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MonitoringJob::from).collect())
    }

    async fn list_unscheduled(&self) -> Result<Vec<MonitoringJob>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM monitoring_jobs WHERE NOT is_scheduled ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(MonitoringJob::from).collect())
    }

    async fn advance_watermark(
        &self,
        job_id: JobId,
        watermark: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE monitoring_jobs SET watermark = $2
             WHERE job_id = $1 AND (watermark IS NULL OR watermark <= $2)",
        )
        .bind(job_id)
        .bind(watermark)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Either the job is gone or another writer got further.
        match self.current_watermark(job_id).await? {
            Some(current) => Err(StoreError::StaleWatermark {
                job_id,
                current,
                proposed: watermark,
            }),
            None => Err(StoreError::NotFound(job_id)),
        }
    }

    async fn mark_scheduled(&self, job_id: JobId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE monitoring_jobs SET is_scheduled = TRUE WHERE job_id = $1 AND NOT is_scheduled",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        self.current_watermark(job_id).await.map(|_| false)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn record_interval(&self, result: IntervalResult) -> Result<IntervalResult, StoreError> {
        let sql = format!(
            "INSERT INTO interval_results ({RESULT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (job_id, batch_key) DO UPDATE SET
                 interval_ts = EXCLUDED.interval_ts,
                 avg_sentiment = EXCLUDED.avg_sentiment,
                 avg_confidence = EXCLUDED.avg_confidence,
                 comment_count = EXCLUDED.comment_count,
                 summary = EXCLUDED.summary
             RETURNING {RESULT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, IntervalRow>(&sql)
            .bind(result.id)
            .bind(result.job_id)
            .bind(&result.batch_key)
            .bind(result.timestamp)
            .bind(result.avg_sentiment)
            .bind(result.avg_confidence)
            .bind(result.comment_count)
            .bind(&result.summary)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn history(&self, job_id: JobId) -> Result<Vec<IntervalResult>, StoreError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM interval_results
             WHERE job_id = $1
             ORDER BY interval_ts, id"
        );
        let rows = sqlx::query_as::<_, IntervalRow>(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(IntervalResult::from).collect())
    }
}
