//! # Messaging Providers
//!
//! - [`RabbitMqConnector`] - RabbitMQ via the lapin crate
//! - [`InMemoryBroker`] - in-process queues for tests and local runs

mod in_memory;
mod rabbitmq;

pub use in_memory::{EventJournal, InMemoryBroker, InMemoryConsumer, InMemorySession, PublishedMessage};
pub use rabbitmq::{RabbitMqConnector, RabbitMqConsumer, RabbitMqSession};
