use chrono::{DateTime, Utc};
use thiserror::Error;
use vibesense_core::{Classify, ErrorKind, JobError, JobId};

/// Errors from job and result store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// A watermark may only move forward. Raised for a concurrent writer or
    /// a replayed dispatch.
    #[error("stale watermark for job {job_id}: current {current}, proposed {proposed}")]
    StaleWatermark {
        job_id: JobId,
        current: DateTime<Utc>,
        proposed: DateTime<Utc>,
    },

    #[error("invalid job: {0}")]
    Invalid(#[from] JobError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(_) => ErrorKind::Transient,
            StoreError::NotFound(_)
            | StoreError::StaleWatermark { .. }
            | StoreError::Invalid(_)
            | StoreError::Migrate(_) => ErrorKind::Fatal,
        }
    }
}
