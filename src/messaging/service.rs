//! # Messaging Service Traits
//!
//! The seams both bridges publish and consume through. A [`BrokerConnector`]
//! dials a [`BrokerSession`] per vhost; a session publishes and opens
//! manual-ack consumers. Implementations: RabbitMQ (`lapin`) and in-memory.

use async_trait::async_trait;

use super::errors::MessagingResult;
use super::types::{Delivery, PublishOptions, QueueTarget};

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish raw bytes to a queue through the default exchange
    async fn publish(
        &self,
        target: &QueueTarget,
        payload: &[u8],
        options: &PublishOptions,
    ) -> MessagingResult<()>;
}

/// A manual-ack consumer bound to one queue
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Wait for the next delivery; `Ok(None)` when the consumer was cancelled
    async fn next_delivery(&mut self) -> MessagingResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()>;

    /// Negative acknowledge; `requeue = false` drops (or dead-letters) the message
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()>;
}

/// An open connection and channel on one vhost
#[async_trait]
pub trait BrokerSession: MessagePublisher {
    type Consumer: MessageConsumer;

    fn vhost(&self) -> &str;

    /// Declare a durable queue (idempotent)
    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()>;

    /// Start consuming with the given prefetch
    async fn consume(&self, queue: &str, prefetch: u16) -> MessagingResult<Self::Consumer>;

    /// Close channel and connection, ignoring errors from a half-open connection
    async fn close(&self);
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    type Session: BrokerSession;

    async fn connect(&self, vhost: &str) -> MessagingResult<Self::Session>;

    /// Vhost used when a target does not name one
    fn default_vhost(&self) -> &str;
}
