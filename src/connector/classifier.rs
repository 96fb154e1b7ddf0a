//! # Outcome Classification
//!
//! Pure decision over an outcome envelope's headers: did the worker succeed,
//! fail for a business reason, or fail for a system reason. Also derives the
//! retry budget reported with a system failure.

use serde_json::Value;

use crate::constants::{error_types, headers, messages};
use crate::messaging::envelope::{value_as_text, value_is_truthy};
use crate::messaging::Envelope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Completion,
    BusinessError {
        /// `camundaErrorCode` header; the engine cannot route a BPMN error without it
        error_code: Option<String>,
        message: String,
    },
    SystemFailure {
        message: String,
    },
}

impl Classification {
    pub fn kind(&self) -> &'static str {
        match self {
            Classification::Completion => "completion",
            Classification::BusinessError { .. } => "business_error",
            Classification::SystemFailure { .. } => "system_failure",
        }
    }
}

/// Classify an outcome envelope.
///
/// A truthy `success` header means completion. Otherwise `error.type ==
/// "system"` is a system failure and anything else, a missing `error`
/// included, is a business error.
pub fn classify(envelope: &Envelope) -> Classification {
    if envelope.header(headers::SUCCESS).is_some_and(value_is_truthy) {
        return Classification::Completion;
    }

    let error = envelope.header(headers::ERROR);
    let message = error
        .and_then(|error| error.get("message"))
        .and_then(value_as_text)
        .unwrap_or_else(|| messages::UNKNOWN_ERROR.to_string());
    let is_system = error
        .and_then(|error| error.get("type"))
        .and_then(Value::as_str)
        .is_some_and(|kind| kind == error_types::SYSTEM);

    if is_system {
        Classification::SystemFailure { message }
    } else {
        Classification::BusinessError {
            error_code: envelope.header_text(headers::ERROR_CODE),
            message,
        }
    }
}

/// Retries left and backoff reported with handleFailure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub remaining: i64,
    pub retry_timeout: i64,
}

impl RetryBudget {
    /// `camundaRetries` counts the current attempt; missing or non-numeric means 1
    pub fn from_headers(envelope: &Envelope) -> Self {
        let retries = envelope.header_i64(headers::RETRIES).unwrap_or(1);
        let retry_timeout = envelope.header_i64(headers::RETRY_TIMEOUT).unwrap_or(0);
        Self {
            remaining: retries.saturating_sub(1).max(0),
            retry_timeout,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
