//! Pipeline bus traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{Delivery, Envelope};
use crate::error::QueueError;

/// Appends envelopes to the channel named in `envelope.channel`.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns once the envelope is durably stored.
    async fn publish(&self, envelope: Envelope) -> Result<(), QueueError>;
}

/// Blanket implementation so `Arc<dyn Publisher>` can be used directly.
#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(&self, envelope: Envelope) -> Result<(), QueueError> {
        (**self).publish(envelope).await
    }
}

/// Pull side of a channel.
///
/// A received message is leased to one consumer for the visibility timeout.
/// It stays on the channel until acknowledged; an unsettled lease expires and
/// the message becomes visible again.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Lease the oldest visible message, or `None` if the channel is idle.
    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, QueueError>;

    /// Remove the message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Release the lease so the message is redelivered right away.
    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Messages retained on `channel`, leased or not.
    async fn depth(&self, channel: &str) -> Result<u64, QueueError>;
}

/// Both sides of the bus.
pub trait Bus: Publisher + Consumer {}

impl<T: Publisher + Consumer + ?Sized> Bus for T {}
