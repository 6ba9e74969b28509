//! Generic stage consumer.
//!
//! A [`StageConsumer`] pulls envelopes from one channel, hands each to a
//! [`StageHandler`], and settles the delivery from the outcome:
//!
//! - success: publish the handler's output (if any), then ack
//! - transient failure: nack for redelivery, or dead-letter once the
//!   optional attempt budget is spent
//! - fatal failure: dead-letter, then ack
//!
//! Handlers run as independent tasks up to the configured concurrency. On
//! shutdown the consumer stops receiving and drains in-flight handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vibesense_core::config::BusConfig;
use vibesense_core::Classify;

use crate::backoff::Backoff;
use crate::bus::Bus;
use crate::envelope::{Delivery, Envelope};
use crate::error::{QueueError, StageError};
use crate::shutdown::Shutdown;

// ── Handler trait ────────────────────────────────────────────────────

/// Stage-specific processing of one envelope.
///
/// Returning `Ok(Some(envelope))` forwards a result to the next stage; it is
/// published before the input is acknowledged.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<Option<Envelope>, StageError>;

    /// Human-readable name (used in logging).
    fn name(&self) -> &str;
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Forwarded,
    Redelivered,
    DeadLettered,
    /// Settling failed; the lease will expire and the message come back.
    Abandoned,
}

// ── Builder ──────────────────────────────────────────────────────────

pub struct StageConsumerBuilder {
    channel: String,
    concurrency: usize,
    poll_interval: Duration,
    max_attempts: Option<u32>,
    backoff: Backoff,
    shutdown_timeout: Duration,
}

impl StageConsumerBuilder {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            max_attempts: None,
            backoff: Backoff::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Apply the `BUS_*` settings.
    pub fn bus_config(self, config: &BusConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval(),
            max_attempts: config.max_attempts,
            backoff: Backoff::from_config(config),
            ..self
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Dead-letter after `n` transient failures (`None` = retry forever).
    pub fn max_attempts(mut self, n: Option<u32>) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self, bus: Arc<dyn Bus>, handler: Arc<dyn StageHandler>) -> StageConsumer {
        StageConsumer {
            channel: self.channel,
            bus,
            handler,
            concurrency: self.concurrency,
            poll_interval: self.poll_interval,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

// ── Consumer ─────────────────────────────────────────────────────────

pub struct StageConsumer {
    channel: String,
    bus: Arc<dyn Bus>,
    handler: Arc<dyn StageHandler>,
    concurrency: usize,
    poll_interval: Duration,
    max_attempts: Option<u32>,
    backoff: Backoff,
    shutdown_timeout: Duration,
}

impl StageConsumer {
    pub fn builder(channel: impl Into<String>) -> StageConsumerBuilder {
        StageConsumerBuilder::new(channel)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Handle and settle one delivery.
    pub async fn process(&self, delivery: Delivery) -> Outcome {
        let env = &delivery.envelope;
        let stage = self.handler.name();
        debug!(stage, id = %env.id, job_id = %env.job_id, attempt = env.attempt, "Handling message");

        match self.handler.handle(env).await {
            Ok(None) => self.ack(&delivery, Outcome::Acked).await,
            Ok(Some(next)) => {
                let next_channel = next.channel.clone();
                if let Err(e) = self.bus.publish(next).await {
                    warn!(stage, id = %env.id, next = %next_channel, error = %e,
                        "Forward failed, redelivering input");
                    return self.nack(&delivery).await;
                }
                self.ack(&delivery, Outcome::Forwarded).await
            }
            Err(e) if e.is_transient() => {
                let exhausted = self.max_attempts.is_some_and(|max| env.attempt >= max);
                if exhausted {
                    warn!(stage, id = %env.id, job_id = %env.job_id, attempt = env.attempt,
                        error = %e, "Attempt budget spent, dead-lettering");
                    self.dead_letter(&delivery).await
                } else {
                    warn!(stage, id = %env.id, job_id = %env.job_id, attempt = env.attempt,
                        error = %e, "Handler failed, redelivering");
                    self.nack(&delivery).await
                }
            }
            Err(e) => {
                warn!(stage, id = %env.id, job_id = %env.job_id, error = %e,
                    "Handler failed permanently, dead-lettering");
                self.dead_letter(&delivery).await
            }
        }
    }

    async fn ack(&self, delivery: &Delivery, outcome: Outcome) -> Outcome {
        match self.bus.ack(delivery).await {
            Ok(()) => outcome,
            Err(e) => {
                warn!(channel = %self.channel, id = %delivery.envelope.id, error = %e,
                    "Ack failed, message will be redelivered");
                Outcome::Abandoned
            }
        }
    }

    async fn nack(&self, delivery: &Delivery) -> Outcome {
        match self.bus.nack(delivery).await {
            Ok(()) => Outcome::Redelivered,
            Err(e) => {
                warn!(channel = %self.channel, id = %delivery.envelope.id, error = %e,
                    "Nack failed, waiting for lease expiry");
                Outcome::Abandoned
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Outcome {
        let dead = delivery.envelope.to_dead_letter();
        let dead_channel = dead.channel.clone();
        if let Err(e) = self.bus.publish(dead).await {
            warn!(channel = %dead_channel, id = %delivery.envelope.id, error = %e,
                "Dead-letter publish failed, redelivering");
            return self.nack(delivery).await;
        }
        self.ack(delivery, Outcome::DeadLettered).await
    }

    /// Consume until `shutdown` fires, then drain in-flight handlers.
    ///
    /// Returns an error only when the bus stays unreachable for longer than
    /// the reconnect budget.
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) -> Result<(), QueueError> {
        let stage = self.handler.name().to_string();
        match self.bus.depth(&self.channel).await {
            Ok(depth) => info!(stage = %stage, channel = %self.channel, depth, "Stage consumer started"),
            Err(e) => warn!(stage = %stage, channel = %self.channel, error = %e, "Stage consumer started, depth unknown"),
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut failures = 0u32;
        let mut result = Ok(());

        loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(stage = %stage, error = %e, "Handler task panicked");
                }
            }

            let permit = tokio::select! {
                p = permits.clone().acquire_owned() => match p {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = shutdown.wait() => break,
            };

            let received = tokio::select! {
                r = self.bus.receive(&self.channel) => r,
                _ = shutdown.wait() => break,
            };

            match received {
                Ok(Some(delivery)) => {
                    failures = 0;
                    let this = self.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        this.process(delivery).await
                    });
                }
                Ok(None) => {
                    failures = 0;
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    failures += 1;
                    let Some(delay) = self.backoff.delay(failures) else {
                        error!(stage = %stage, channel = %self.channel, error = %e,
                            attempts = failures - 1, "Bus unreachable, giving up");
                        result = Err(e);
                        break;
                    };
                    warn!(stage = %stage, channel = %self.channel, error = %e,
                        attempt = failures, delay_secs = delay.as_secs(), "Receive failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }

        self.drain(&mut tasks, &stage).await;
        result
    }

    async fn drain(&self, tasks: &mut JoinSet<Outcome>, stage: &str) {
        if tasks.is_empty() {
            info!(stage, "Stage consumer stopped");
            return;
        }
        info!(stage, in_flight = tasks.len(), timeout = ?self.shutdown_timeout, "Draining in-flight handlers");
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(stage, remaining = tasks.len(), "Drain timed out, aborting handlers");
            tasks.abort_all();
        }
        info!(stage, "Stage consumer stopped");
    }
}
