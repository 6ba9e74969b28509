//! In-process bus with visibility-timeout leases.
//!
//! Durable only for the lifetime of the process; used by tests and by
//! single-binary deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use vibesense_core::{Clock, SystemClock};

use crate::bus::{Consumer, Publisher};
use crate::envelope::{Delivery, Envelope};
use crate::error::QueueError;

struct Lease {
    envelope: Envelope,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Channel {
    ready: VecDeque<Envelope>,
    leased: HashMap<Uuid, Lease>,
}

impl Channel {
    /// Put expired leases back at the head, oldest enqueue first.
    fn reclaim(&mut self, now: DateTime<Utc>) {
        let expired: Vec<Uuid> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(receipt, _)| *receipt)
            .collect();
        let mut back: Vec<Envelope> = expired
            .into_iter()
            .filter_map(|r| self.leased.remove(&r))
            .map(|lease| lease.envelope)
            .collect();
        back.sort_by_key(|e| std::cmp::Reverse(e.enqueued_at));
        for envelope in back {
            debug!(id = %envelope.id, channel = %envelope.channel, "Lease expired, redelivering");
            self.ready.push_front(envelope);
        }
    }
}

pub struct MemoryBus {
    clock: Arc<dyn Clock>,
    visibility_timeout: Duration,
    channels: Mutex<HashMap<String, Channel>>,
}

impl MemoryBus {
    pub fn new(visibility_timeout: std::time::Duration) -> Self {
        Self::with_clock(Arc::new(SystemClock), visibility_timeout)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, visibility_timeout: std::time::Duration) -> Self {
        Self {
            clock,
            visibility_timeout: Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| Duration::seconds(300)),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the envelopes waiting (not leased) on `channel`.
    pub async fn pending(&self, channel: &str) -> Vec<Envelope> {
        self.channels
            .lock()
            .await
            .get(channel)
            .map(|c| c.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn settle(&self, delivery: &Delivery) -> Result<Envelope, QueueError> {
        let mut channels = self.channels.lock().await;
        channels
            .get_mut(&delivery.envelope.channel)
            .and_then(|c| c.leased.remove(&delivery.receipt))
            .map(|lease| lease.envelope)
            .ok_or(QueueError::LeaseExpired(delivery.receipt))
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), QueueError> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(envelope.channel.clone())
            .or_default()
            .ready
            .push_back(envelope);
        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryBus {
    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, QueueError> {
        let now = self.clock.now();
        let mut channels = self.channels.lock().await;
        let Some(chan) = channels.get_mut(channel) else {
            return Ok(None);
        };
        chan.reclaim(now);

        let Some(mut envelope) = chan.ready.pop_front() else {
            return Ok(None);
        };
        envelope.attempt += 1;
        let receipt = Uuid::new_v4();
        chan.leased.insert(
            receipt,
            Lease {
                envelope: envelope.clone(),
                expires_at: now + self.visibility_timeout,
            },
        );
        Ok(Some(Delivery { envelope, receipt }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle(delivery).await.map(|_| ())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let envelope = self.settle(delivery).await?;
        let mut channels = self.channels.lock().await;
        channels
            .entry(envelope.channel.clone())
            .or_default()
            .ready
            .push_front(envelope);
        Ok(())
    }

    async fn depth(&self, channel: &str) -> Result<u64, QueueError> {
        let channels = self.channels.lock().await;
        Ok(channels
            .get(channel)
            .map(|c| (c.ready.len() + c.leased.len()) as u64)
            .unwrap_or(0))
    }
}
