//! Analysis output and the statistics derived from it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobId;

/// Sentiment label as reported by the model server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Numeric score used for averaging.
    pub fn score(self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Negative => 0.0,
            SentimentLabel::Neutral => 0.5,
        }
    }

    /// Human label for a mean score.
    pub fn classify_score(score: f64) -> &'static str {
        if score >= 0.5 {
            "Positive"
        } else {
            "Negative"
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "POSITIVE"),
            SentimentLabel::Negative => write!(f, "NEGATIVE"),
            SentimentLabel::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// One analyzed comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub comment_id: Option<String>,
    pub sentiment: SentimentLabel,
    pub confidence: f64,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A persisted per-batch statistic. Rows are unique per `(job_id, batch_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalResult {
    pub id: Uuid,
    pub job_id: JobId,
    /// Stable digest of the batch contents; redelivery produces the same key.
    pub batch_key: String,
    /// Causation timestamp of the dispatch this batch came from.
    pub timestamp: DateTime<Utc>,
    pub avg_sentiment: f64,
    pub avg_confidence: f64,
    pub comment_count: i64,
    pub summary: Option<String>,
}

/// Running statistic over a job's whole interval history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub interval_sentiment: f64,
    pub interval_confidence: f64,
    pub overall_sentiment: f64,
    pub overall_confidence: f64,
    pub confidence_interval: (f64, f64),
    pub sample_count: usize,
}
