//! `aggregation` → `notification`: persist the interval statistic and
//! recompute the job's running aggregate from its whole history.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;
use vibesense_core::{
    pipeline, Aggregate, AggregateReport, AnalysisResult, AnalyzedBatch, IntervalResult, JobId,
    PipelineMessage,
};
use vibesense_queue::{Envelope, StageError, StageHandler};
use vibesense_store::{ResultStore, StoreError};

use crate::stats;

/// Stable digest of a batch: SHA-256 over the sorted comment ids.
///
/// Results without ids fall back to their serialized form, which is still
/// stable across redelivery of the same message.
pub fn batch_key(results: &[AnalysisResult]) -> String {
    let mut ids: Vec<String> = results.iter().filter_map(|r| r.comment_id.clone()).collect();
    if ids.is_empty() {
        ids = results
            .iter()
            .map(|r| serde_json::to_string(r).unwrap_or_default())
            .collect();
    }
    ids.sort();
    let digest = Sha256::digest(ids.join("\n").as_bytes());
    format!("{digest:x}")
}

/// Running aggregate for `job_id` as of its most recent interval.
///
/// Returns `Ok(None)` when the job has no recorded intervals yet.
pub async fn latest_aggregate(
    store: &dyn ResultStore,
    job_id: JobId,
) -> Result<Option<Aggregate>, StoreError> {
    let history = store.history(job_id).await?;
    let Some(latest) = history.last() else {
        return Ok(None);
    };
    Ok(stats::overall(latest, &history).ok())
}

fn joined_summary(results: &[AnalysisResult]) -> Option<String> {
    let parts: Vec<&str> = results
        .iter()
        .filter_map(|r| r.summary.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

pub struct AggregationStage {
    results: Arc<dyn ResultStore>,
}

impl AggregationStage {
    pub fn new(results: Arc<dyn ResultStore>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl StageHandler for AggregationStage {
    async fn handle(&self, envelope: &Envelope) -> Result<Option<Envelope>, StageError> {
        let message: PipelineMessage<AnalyzedBatch> =
            envelope.decode().map_err(StageError::classify)?;
        let batch = &message.payload.results;

        let (avg_sentiment, avg_confidence) =
            stats::interval_means(batch).map_err(StageError::classify)?;
        let interval = IntervalResult {
            id: Uuid::new_v4(),
            job_id: message.job_id,
            batch_key: batch_key(batch),
            timestamp: message.causation_timestamp,
            avg_sentiment,
            avg_confidence,
            comment_count: batch.len() as i64,
            summary: joined_summary(batch),
        };

        let stored = self
            .results
            .record_interval(interval)
            .await
            .map_err(StageError::classify)?;
        let history = self
            .results
            .history(message.job_id)
            .await
            .map_err(StageError::classify)?;
        let aggregate = stats::overall(&stored, &history).map_err(StageError::classify)?;

        info!(
            job_id = %message.job_id,
            interval = stored.avg_sentiment,
            overall = aggregate.overall_sentiment,
            intervals = aggregate.sample_count,
            "Interval aggregated"
        );

        let report = AggregateReport {
            aggregate,
            summary: stored.summary,
        };
        Envelope::new(pipeline::NOTIFICATION, &message.follow(report))
            .map(Some)
            .map_err(StageError::classify)
    }

    fn name(&self) -> &str {
        "aggregation"
    }
}
