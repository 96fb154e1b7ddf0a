//! # Synchronous Correlation
//!
//! A process started by a synchronous caller stores a correlation id and a
//! reply queue in its variables. When an outcome resolves such a task the
//! caller receives exactly one reply on that queue.

use serde_json::{json, Value};

use crate::camunda::Variables;
use crate::constants::variables;
use crate::messaging::envelope::value_as_text;
use crate::messaging::{MessagePublisher, MessagingResult, PublishOptions, QueueTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub correlation_id: String,
    pub reply_to: String,
}

impl ReplyTarget {
    /// Both correlation variables must hold usable text for a task to be synchronous
    pub fn from_snapshot(snapshot: &Variables) -> Option<Self> {
        let text = |name: &str| {
            snapshot
                .get(name)
                .filter(|variable| variable.is_set())
                .and_then(|variable| value_as_text(&variable.value))
        };
        Some(Self {
            correlation_id: text(variables::CORRELATION_ID)?,
            reply_to: text(variables::CORRELATION_REPLY_TO)?,
        })
    }
}

pub fn is_synchronous(snapshot: &Variables) -> bool {
    ReplyTarget::from_snapshot(snapshot).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    Success,
    Error(String),
}

impl ReplyPayload {
    pub fn to_json(&self) -> Value {
        match self {
            ReplyPayload::Success => json!({ "success": true }),
            ReplyPayload::Error(message) => json!({
                "success": false,
                "error": [{ "message": message }]
            }),
        }
    }
}

/// Publish one reply to the caller's queue, correlated by id
pub async fn send_reply<P>(
    publisher: &P,
    target: &ReplyTarget,
    payload: &ReplyPayload,
) -> MessagingResult<()>
where
    P: MessagePublisher + ?Sized,
{
    let body = serde_json::to_vec(&payload.to_json())?;
    publisher
        .publish(
            &QueueTarget::new(target.reply_to.clone()),
            &body,
            &PublishOptions::reply(target.correlation_id.clone()),
        )
        .await
}
