//! `analysis` → `aggregation`: run the analyzer over one comment batch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vibesense_core::{pipeline, AnalyzedBatch, CommentBatch, PipelineMessage};
use vibesense_queue::{Envelope, StageError, StageHandler};

use crate::analyzer::{AnalysisError, Analyzer};

pub struct AnalysisStage {
    analyzer: Arc<dyn Analyzer>,
}

impl AnalysisStage {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl StageHandler for AnalysisStage {
    async fn handle(&self, envelope: &Envelope) -> Result<Option<Envelope>, StageError> {
        let message: PipelineMessage<CommentBatch> =
            envelope.decode().map_err(StageError::classify)?;
        let batch = &message.payload;
        if batch.items.is_empty() {
            debug!(job_id = %message.job_id, "Empty batch, nothing to analyze");
            return Ok(None);
        }

        let texts: Vec<String> = batch.items.iter().map(|i| i.text.clone()).collect();
        let mut results = self
            .analyzer
            .analyze(&texts)
            .await
            .map_err(StageError::classify)?;
        if results.len() != batch.items.len() {
            return Err(StageError::classify(AnalysisError::Mismatch {
                expected: batch.items.len(),
                got: results.len(),
            }));
        }
        for (result, item) in results.iter_mut().zip(&batch.items) {
            result.comment_id = Some(item.comment_id.clone());
        }

        debug!(
            job_id = %message.job_id,
            batch = batch.batch_index + 1,
            of = batch.batch_count,
            results = results.len(),
            "Batch analyzed"
        );

        let next = message.follow(AnalyzedBatch { results });
        Envelope::new(pipeline::AGGREGATION, &next)
            .map(Some)
            .map_err(StageError::classify)
    }

    fn name(&self) -> &str {
        "analysis"
    }
}
