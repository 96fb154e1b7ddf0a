//! # Messaging Module
//!
//! The envelope wire format and the broker abstraction both bridges run on.

pub mod envelope;
pub mod errors;
pub mod pool;
pub mod providers;
pub mod service;
pub mod types;

pub use envelope::Envelope;
pub use errors::{MessagingError, MessagingResult};
pub use pool::SessionPool;
pub use service::{BrokerConnector, BrokerSession, MessageConsumer, MessagePublisher};
pub use types::{Delivery, PublishOptions, QueueTarget, ReceiptHandle};
