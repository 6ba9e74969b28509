//! PostgreSQL-backed durable channels.
//!
//! Each message is a row in `pipeline_messages`. Receiving pushes
//! `visible_at` forward by the visibility timeout and stamps a fresh receipt;
//! `FOR UPDATE SKIP LOCKED` keeps concurrent consumers off the same row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::bus::{Consumer, Publisher};
use crate::envelope::{Delivery, Envelope};
use crate::error::QueueError;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub channel: String,
    pub job_id: Uuid,
    pub causation_timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub attempt: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl From<MessageRow> for Envelope {
    fn from(row: MessageRow) -> Self {
        Envelope {
            id: row.id,
            channel: row.channel,
            job_id: row.job_id,
            causation_timestamp: row.causation_timestamp,
            payload: row.payload,
            attempt: u32::try_from(row.attempt).unwrap_or(0),
            enqueued_at: row.enqueued_at,
        }
    }
}

#[derive(Clone)]
pub struct PgBus {
    pool: PgPool,
    visibility_timeout: Duration,
}

impl PgBus {
    pub fn new(pool: PgPool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            visibility_timeout,
        }
    }
}

#[async_trait]
impl Publisher for PgBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO pipeline_messages
                 (id, channel, job_id, causation_timestamp, payload, attempt, enqueued_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(envelope.id)
        .bind(&envelope.channel)
        .bind(envelope.job_id)
        .bind(envelope.causation_timestamp)
        .bind(&envelope.payload)
        .bind(i32::try_from(envelope.attempt).unwrap_or(i32::MAX))
        .bind(envelope.enqueued_at)
        .execute(&self.pool)
        .await?;

        debug!(id = %envelope.id, channel = %envelope.channel, job_id = %envelope.job_id, "Published");
        Ok(())
    }
}

#[async_trait]
impl Consumer for PgBus {
    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, QueueError> {
        let receipt = Uuid::new_v4();
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE pipeline_messages
             SET attempt = attempt + 1,
                 receipt = $3,
                 visible_at = now() + make_interval(secs => $2)
             WHERE seq = (
                 SELECT seq FROM pipeline_messages
                 WHERE channel = $1 AND visible_at <= now()
                 ORDER BY seq
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING id, channel, job_id, causation_timestamp, payload, attempt, enqueued_at",
        )
        .bind(channel)
        .bind(self.visibility_timeout.as_secs_f64())
        .bind(receipt)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Delivery {
            envelope: row.into(),
            receipt,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM pipeline_messages WHERE id = $1 AND receipt = $2")
            .bind(delivery.envelope.id)
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::LeaseExpired(delivery.receipt));
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE pipeline_messages SET visible_at = now(), receipt = NULL
             WHERE id = $1 AND receipt = $2",
        )
        .bind(delivery.envelope.id)
        .bind(delivery.receipt)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::LeaseExpired(delivery.receipt));
        }
        Ok(())
    }

    async fn depth(&self, channel: &str) -> Result<u64, QueueError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pipeline_messages WHERE channel = $1",
        )
        .bind(channel)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_attempt_column_clamps_to_zero() {
        let env: Envelope = MessageRow {
            id: Uuid::new_v4(),
            channel: "analysis".into(),
            job_id: Uuid::new_v4(),
            causation_timestamp: Utc::now(),
            payload: serde_json::json!({"items": []}),
            attempt: -1,
            enqueued_at: Utc::now(),
        }
        .into();
        assert_eq!(env.attempt, 0);
        assert_eq!(env.channel, "analysis");
    }
}
