//! Channel names and stage payloads carried on the pipeline bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::result::{Aggregate, AnalysisResult};

// ── Channels ─────────────────────────────────────────────────────────

/// dispatch → analysis
pub const ANALYSIS: &str = "analysis";
/// analysis → aggregation
pub const AGGREGATION: &str = "aggregation";
/// aggregation → notification
pub const NOTIFICATION: &str = "notification";

pub const ALL_CHANNELS: &[&str] = &[ANALYSIS, AGGREGATION, NOTIFICATION];

/// Dead-letter channel paired with `channel`.
pub fn dead_letter(channel: &str) -> String {
    format!("{channel}.dead")
}

// ── Envelope ─────────────────────────────────────────────────────────

/// Typed view of a bus message: who it is for, which watermark it advances
/// to, and the stage-specific body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMessage<P> {
    pub job_id: JobId,
    pub causation_timestamp: DateTime<Utc>,
    pub payload: P,
}

impl<P> PipelineMessage<P> {
    pub fn new(job_id: JobId, causation_timestamp: DateTime<Utc>, payload: P) -> Self {
        Self {
            job_id,
            causation_timestamp,
            payload,
        }
    }

    /// Carry identity and causation over to the next stage's payload.
    pub fn follow<Q>(&self, payload: Q) -> PipelineMessage<Q> {
        PipelineMessage {
            job_id: self.job_id,
            causation_timestamp: self.causation_timestamp,
            payload,
        }
    }
}

// ── Payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub comment_id: String,
    pub text: String,
}

/// Published by fetch-and-dispatch on [`ANALYSIS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentBatch {
    pub items: Vec<BatchItem>,
    /// Zero-based position within one dispatch.
    pub batch_index: usize,
    pub batch_count: usize,
}

/// Published by the analysis stage on [`AGGREGATION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedBatch {
    pub results: Vec<AnalysisResult>,
}

/// Published by the aggregation stage on [`NOTIFICATION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub aggregate: Aggregate,
    /// Latest per-batch summary, if the model produced one.
    pub summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn dead_letter_suffix() {
        assert_eq!(dead_letter(ANALYSIS), "analysis.dead");
    }

    #[test]
    fn follow_keeps_identity() {
        let msg = PipelineMessage::new(Uuid::new_v4(), Utc::now(), 1u32);
        let next = msg.follow("next");
        assert_eq!(next.job_id, msg.job_id);
        assert_eq!(next.causation_timestamp, msg.causation_timestamp);
        assert_eq!(next.payload, "next");
    }
}
