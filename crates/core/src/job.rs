//! Monitoring jobs and the comments they collect.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

pub type JobId = Uuid;

/// Convert fractional seconds into a chrono duration (millisecond precision).
pub fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::milliseconds((seconds * 1000.0).round() as i64)
}

// ── MonitoringJob ────────────────────────────────────────────────────

/// A bounded-lifetime watch over one external post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringJob {
    pub job_id: JobId,
    /// External content identifier to poll (e.g. a YouTube video id).
    pub target_id: String,
    pub interval_seconds: f64,
    pub total_duration_seconds: f64,
    pub created_at: DateTime<Utc>,
    /// Highest `published_at` already dispatched; `None` = never fetched.
    pub watermark: Option<DateTime<Utc>>,
    /// Set once a timer entry exists in the scheduler.
    pub is_scheduled: bool,
    pub recipient: String,
    pub recipient_name: Option<String>,
    pub display_title: String,
}

impl MonitoringJob {
    /// The instant at and after which no fetch may be dispatched.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + seconds_to_duration(self.total_duration_seconds)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn interval(&self) -> Duration {
        seconds_to_duration(self.interval_seconds)
    }

    /// Interval length in hours, as shown to subscribers.
    pub fn interval_hours(&self) -> f64 {
        self.interval_seconds / 3600.0
    }
}

/// Parameters for a job about to be created by the intake layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub target_id: String,
    pub interval_seconds: f64,
    pub total_duration_seconds: f64,
    pub recipient: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub display_title: String,
}

impl NewJob {
    pub fn validate(&self) -> Result<(), JobError> {
        if !(self.interval_seconds.is_finite() && self.interval_seconds > 0.0) {
            return Err(JobError::InvalidInterval(self.interval_seconds));
        }
        if !(self.total_duration_seconds.is_finite() && self.total_duration_seconds > 0.0) {
            return Err(JobError::InvalidDuration(self.total_duration_seconds));
        }
        if self.target_id.trim().is_empty() {
            return Err(JobError::EmptyTarget);
        }
        if self.recipient.trim().is_empty() {
            return Err(JobError::EmptyRecipient);
        }
        Ok(())
    }

    /// Materialize the job record with a fresh id.
    pub fn into_job(self, created_at: DateTime<Utc>) -> Result<MonitoringJob, JobError> {
        self.validate()?;
        Ok(MonitoringJob {
            job_id: Uuid::new_v4(),
            target_id: self.target_id,
            interval_seconds: self.interval_seconds,
            total_duration_seconds: self.total_duration_seconds,
            created_at,
            watermark: None,
            is_scheduled: false,
            recipient: self.recipient,
            recipient_name: self.recipient_name,
            display_title: self.display_title,
        })
    }
}

// ── Comment ──────────────────────────────────────────────────────────

/// One comment as returned by the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: HashMap<String, i64>,
}
