//! Wire envelope stored on a channel.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vibesense_core::pipeline::dead_letter;
use vibesense_core::{JobId, PipelineMessage};

use crate::error::QueueError;

/// A message as the bus sees it: routing and delivery bookkeeping around an
/// opaque JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub channel: String,
    pub job_id: JobId,
    pub causation_timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    /// Number of deliveries so far, including the current one.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    /// Serialize a typed pipeline message for `channel`.
    pub fn new<P: Serialize>(
        channel: impl Into<String>,
        message: &PipelineMessage<P>,
    ) -> Result<Self, QueueError> {
        let payload =
            serde_json::to_value(&message.payload).map_err(|e| QueueError::Encode(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            job_id: message.job_id,
            causation_timestamp: message.causation_timestamp,
            payload,
            attempt: 0,
            enqueued_at: Utc::now(),
        })
    }

    /// Deserialize the payload back into a typed pipeline message.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<PipelineMessage<P>, QueueError> {
        let payload = serde_json::from_value(self.payload.clone())
            .map_err(|e| QueueError::Decode(e.to_string()))?;
        Ok(PipelineMessage::new(self.job_id, self.causation_timestamp, payload))
    }

    /// Copy of this message addressed to the channel's dead-letter channel.
    pub fn to_dead_letter(&self) -> Envelope {
        Envelope {
            id: Uuid::new_v4(),
            channel: dead_letter(&self.channel),
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// A received envelope plus the lease token needed to settle it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    pub receipt: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibesense_core::{pipeline, BatchItem, CommentBatch};

    #[test]
    fn decode_restores_typed_payload() {
        let msg = PipelineMessage::new(
            Uuid::new_v4(),
            Utc::now(),
            CommentBatch {
                items: vec![BatchItem {
                    comment_id: "c1".into(),
                    text: "great video".into(),
                }],
                batch_index: 0,
                batch_count: 1,
            },
        );
        let env = Envelope::new(pipeline::ANALYSIS, &msg).unwrap();
        assert_eq!(env.attempt, 0);
        let back: PipelineMessage<CommentBatch> = env.decode().unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn decode_into_wrong_shape_fails() {
        let msg = PipelineMessage::new(Uuid::new_v4(), Utc::now(), "just text");
        let env = Envelope::new(pipeline::ANALYSIS, &msg).unwrap();
        let err = env.decode::<CommentBatch>().unwrap_err();
        assert!(matches!(err, QueueError::Decode(_)));
    }

    #[test]
    fn dead_letter_copy_keeps_body() {
        let msg = PipelineMessage::new(Uuid::new_v4(), Utc::now(), 7u8);
        let env = Envelope::new(pipeline::AGGREGATION, &msg).unwrap();
        let dead = env.to_dead_letter();
        assert_eq!(dead.channel, "aggregation.dead");
        assert_ne!(dead.id, env.id);
        assert_eq!(dead.payload, env.payload);
        assert_eq!(dead.job_id, env.job_id);
    }
}
