//! # Messaging Types
//!
//! Provider-agnostic addressing, publish options and deliveries.

use std::fmt;

/// A queue on a specific vhost; `vhost: None` means the session's own vhost
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueTarget {
    pub vhost: Option<String>,
    pub queue: String,
}

impl QueueTarget {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            vhost: None,
            queue: queue.into(),
        }
    }

    pub fn on_vhost(vhost: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            vhost: Some(vhost.into()),
            queue: queue.into(),
        }
    }
}

impl fmt::Display for QueueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.vhost {
            Some(vhost) => write!(f, "{}@{}", self.queue, vhost),
            None => f.write_str(&self.queue),
        }
    }
}

/// Per-publish delivery options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Broker must store the message durably (delivery mode 2)
    pub persistent: bool,
    /// Correlation token for request/reply
    pub correlation_id: Option<String>,
}

impl PublishOptions {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            correlation_id: None,
        }
    }

    pub fn reply(correlation_id: impl Into<String>) -> Self {
        Self {
            persistent: false,
            correlation_id: Some(correlation_id.into()),
        }
    }
}

/// Handle used to acknowledge a delivery on the channel it arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(u64);

impl ReceiptHandle {
    pub fn new(delivery_tag: u64) -> Self {
        Self(delivery_tag)
    }

    pub fn delivery_tag(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ReceiptHandle {
    fn from(delivery_tag: u64) -> Self {
        Self(delivery_tag)
    }
}

/// One message taken from a queue, not yet acknowledged
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub receipt_handle: ReceiptHandle,
    pub correlation_id: Option<String>,
    pub redelivered: bool,
}

impl Delivery {
    /// Body as text for logging; invalid UTF-8 is replaced
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_target_display() {
        assert_eq!(QueueTarget::new("orders").to_string(), "orders");
        assert_eq!(
            QueueTarget::on_vhost("billing", "orders").to_string(),
            "orders@billing"
        );
    }

    #[test]
    fn test_publish_options() {
        let envelope = PublishOptions::persistent();
        assert!(envelope.persistent);
        assert!(envelope.correlation_id.is_none());

        let reply = PublishOptions::reply("corr-1");
        assert!(!reply.persistent);
        assert_eq!(reply.correlation_id.as_deref(), Some("corr-1"));
    }
}
