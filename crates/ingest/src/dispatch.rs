//! Fetch-and-dispatch: turn new comments into pipeline batches.
//!
//! One run loads the job, fetches from the platform, keeps comments strictly
//! newer than the watermark, publishes them in fixed-size batches and only
//! then advances the watermark. A publish failure leaves the watermark where
//! it was so the next run re-dispatches the same comments.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use vibesense_core::{
    pipeline, BatchItem, Classify, Clock, Comment, CommentBatch, ErrorKind, JobId, PipelineMessage,
};
use vibesense_queue::{Envelope, Publisher, QueueError};
use vibesense_store::{JobStore, StoreError};

use crate::fetch::{CommentFetcher, FetchError};
use crate::preprocess::preprocess;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job store: {0}")]
    Store(#[from] StoreError),

    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),

    #[error("publish failed after {published}/{total} batches: {source}")]
    Publish {
        published: usize,
        total: usize,
        #[source]
        source: QueueError,
    },
}

impl Classify for DispatchError {
    fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Store(e) => e.kind(),
            DispatchError::Fetch(e) => e.kind(),
            DispatchError::Publish { source, .. } => source.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Job expired before dispatch; nothing published.
    Expired,
    /// No comment newer than the watermark.
    Empty,
    Dispatched {
        comments: usize,
        batches: usize,
        watermark: DateTime<Utc>,
        /// `false` when a concurrent writer had already moved the watermark further.
        advanced: bool,
    },
}

/// Keep comments strictly newer than `watermark`, oldest first, one per id.
pub fn select_new(comments: Vec<Comment>, watermark: Option<DateTime<Utc>>) -> Vec<Comment> {
    let mut seen = HashSet::new();
    let mut fresh: Vec<Comment> = comments
        .into_iter()
        .filter(|c| watermark.map_or(true, |w| c.published_at > w))
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    fresh.sort_by_key(|c| c.published_at);
    fresh
}

pub struct FetchDispatcher {
    jobs: Arc<dyn JobStore>,
    fetcher: Arc<dyn CommentFetcher>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    preprocess: bool,
}

impl FetchDispatcher {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        fetcher: Arc<dyn CommentFetcher>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            fetcher,
            publisher,
            clock,
            batch_size: 50,
            preprocess: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_preprocess(mut self, enabled: bool) -> Self {
        self.preprocess = enabled;
        self
    }

    pub async fn run(&self, job_id: JobId) -> Result<DispatchOutcome, DispatchError> {
        let job = self.jobs.get(job_id).await?;
        if job.is_expired(self.clock.now()) {
            debug!(job_id = %job_id, "Job expired, skipping fetch");
            return Ok(DispatchOutcome::Expired);
        }

        let fetched = self
            .fetcher
            .fetch_comments(&job.target_id, job.watermark)
            .await?;
        let fetched_count = fetched.len();
        let fresh = select_new(fetched, job.watermark);

        let Some(causation) = fresh.iter().map(|c| c.published_at).max() else {
            debug!(job_id = %job_id, fetched = fetched_count, "No new comments");
            return Ok(DispatchOutcome::Empty);
        };

        // The fetch may have outlived the job.
        if job.is_expired(self.clock.now()) {
            debug!(job_id = %job_id, "Job expired during fetch, suppressing dispatch");
            return Ok(DispatchOutcome::Expired);
        }

        let envelopes = self.build_batches(job_id, causation, &fresh);
        let total = envelopes.len();
        for (published, envelope) in envelopes.into_iter().enumerate() {
            let envelope = envelope.map_err(|source| DispatchError::Publish {
                published,
                total,
                source,
            })?;
            self.publisher
                .publish(envelope)
                .await
                .map_err(|source| DispatchError::Publish {
                    published,
                    total,
                    source,
                })?;
        }

        let advanced = match self.jobs.advance_watermark(job_id, causation).await {
            Ok(()) => true,
            Err(StoreError::StaleWatermark { current, .. }) => {
                warn!(
                    job_id = %job_id,
                    current = %current,
                    proposed = %causation,
                    "Watermark already ahead, skipping advance"
                );
                false
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            job_id = %job_id,
            comments = fresh.len(),
            batches = total,
            watermark = %causation,
            "Dispatched new comments"
        );

        Ok(DispatchOutcome::Dispatched {
            comments: fresh.len(),
            batches: total,
            watermark: causation,
            advanced,
        })
    }

    fn build_batches(
        &self,
        job_id: JobId,
        causation: DateTime<Utc>,
        comments: &[Comment],
    ) -> Vec<Result<Envelope, QueueError>> {
        let chunks: Vec<&[Comment]> = comments.chunks(self.batch_size).collect();
        let batch_count = chunks.len();
        chunks
            .into_iter()
            .enumerate()
            .map(|(batch_index, chunk)| {
                let items = chunk
                    .iter()
                    .map(|c| BatchItem {
                        comment_id: c.id.clone(),
                        text: if self.preprocess {
                            preprocess(&c.text)
                        } else {
                            c.text.clone()
                        },
                    })
                    .collect();
                let message = PipelineMessage::new(
                    job_id,
                    causation,
                    CommentBatch {
                        items,
                        batch_index,
                        batch_count,
                    },
                );
                Envelope::new(pipeline::ANALYSIS, &message)
            })
            .collect()
    }
}
