//! # Messaging Error Types
//!
//! Broker-side failures. Everything here is a transport fault: the outbound
//! loop reconnects on it and the inbound publisher drops the cached session.

use thiserror::Error;

/// Broker error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Publish to {queue_name} failed: {message}")]
    Publish { queue_name: String, message: String },

    #[error("Acknowledgement of delivery {delivery_tag} on {queue_name} failed: {message}")]
    Acknowledgement {
        queue_name: String,
        delivery_tag: u64,
        message: String,
    },

    #[error("Consumer for {queue_name} closed")]
    ConsumerClosed { queue_name: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create an ack/nack error
    pub fn acknowledgement(
        queue_name: impl Into<String>,
        delivery_tag: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::Acknowledgement {
            queue_name: queue_name.into(),
            delivery_tag,
            message: message.into(),
        }
    }

    pub fn consumer_closed(queue_name: impl Into<String>) -> Self {
        Self::ConsumerClosed {
            queue_name: queue_name.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::MessageSerialization {
            message: err.to_string(),
        }
    }
}

impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        Self::connection(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
