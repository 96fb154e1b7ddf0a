//! # Connector
//!
//! The two bridges between external tasks and queues, and the pieces they
//! are built from.

pub mod classifier;
pub mod correlation;
pub mod demo;
pub mod inbound;
pub mod outbound;
pub mod parameters;
pub mod topic;

pub use classifier::{classify, Classification, RetryBudget};
pub use correlation::{is_synchronous, send_reply, ReplyPayload, ReplyTarget};
pub use demo::EchoWorker;
pub use inbound::{compose_envelope, InboundBridge, OutgoingEnvelope};
pub use outbound::{AckDecision, OutboundBridge, Resolution};
pub use parameters::{ParameterDescriptor, ParameterRegistry, ResolvedParameters};
pub use topic::{TaskHandlerKind, TopicBinding};
