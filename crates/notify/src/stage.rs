//! `notification`: email the subscriber the latest report.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vibesense_core::{AggregateReport, PipelineMessage};
use vibesense_queue::{Envelope, StageError, StageHandler};
use vibesense_store::JobStore;

use crate::templating::{ReportContext, TemplateRenderer};
use crate::traits::{Notifier, Recipient};

/// Terminal stage. Looks up the job for recipient and title, renders the
/// report and hands it to the notifier. A job that no longer exists is a
/// fatal failure.
pub struct NotificationStage {
    jobs: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    renderer: TemplateRenderer,
}

impl NotificationStage {
    pub fn new(jobs: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            jobs,
            notifier,
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }
}

#[async_trait]
impl StageHandler for NotificationStage {
    async fn handle(&self, envelope: &Envelope) -> Result<Option<Envelope>, StageError> {
        let message: PipelineMessage<AggregateReport> =
            envelope.decode().map_err(StageError::classify)?;
        let job = self
            .jobs
            .get(message.job_id)
            .await
            .map_err(StageError::classify)?;

        let notification = self
            .renderer
            .render(&ReportContext::new(&job, &message))
            .map_err(StageError::classify)?;
        let recipient = Recipient {
            address: job.recipient.clone(),
            name: job.recipient_name.clone(),
        };
        self.notifier
            .send(&recipient, &notification)
            .await
            .map_err(StageError::classify)?;

        info!(
            job_id = %job.job_id,
            channel = self.notifier.channel_name(),
            interval = %message.causation_timestamp,
            "Report sent"
        );
        Ok(None)
    }

    fn name(&self) -> &str {
        "notification"
    }
}
