//! # Bridge Errors
//!
//! One error type for both bridges, plus the fault taxonomy that decides how a
//! failure propagates: fatal configuration faults stop the worker process,
//! transport faults are retried by the loops, everything else is resolved
//! per message.

use std::fmt;

use thiserror::Error;

use crate::messaging::MessagingError;

/// How a failure is handled by the bridge loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// Process-definition or deployment mistake; abort and exit non-zero
    FatalConfig,
    /// Structurally invalid outcome message; drop, ack and log
    ValidationReject,
    /// Task-domain failure surfaced on the engine's error channel
    BusinessError,
    /// Infrastructure failure retried by engine re-dispatch
    SystemFailure,
    /// Broker or engine unreachable; retried by the loop, only logged
    TransportFault,
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultClass::FatalConfig => "fatal_config",
            FaultClass::ValidationReject => "validation_reject",
            FaultClass::BusinessError => "business_error",
            FaultClass::SystemFailure => "system_failure",
            FaultClass::TransportFault => "transport_fault",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(
        "`{name}` param not set from topic <{topic}> task <{task_id}> of process <{process_definition_key}> process instance <{process_instance_id}>"
    )]
    MissingParameter {
        name: String,
        task_id: String,
        topic: String,
        process_definition_key: String,
        process_instance_id: String,
    },

    #[error("`{name}` param of task <{task_id}> is invalid: {reason}")]
    InvalidParameter {
        name: String,
        task_id: String,
        reason: String,
    },

    #[error("Task <{task_id}> was fetched from topic <{actual}> but this worker serves <{expected}>")]
    TopicMismatch {
        task_id: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown topic handler: {0}")]
    UnknownHandler(String),

    #[error("Variable `message` of task <{task_id}> is not a valid envelope: {reason}")]
    InvalidMessageVariable { task_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine operation {operation} failed: {message}")]
    Engine { operation: String, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BridgeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an engine-side error for the named REST operation
    pub fn engine(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Classify this error for propagation
    pub fn fault_class(&self) -> FaultClass {
        match self {
            BridgeError::MissingParameter { .. }
            | BridgeError::InvalidParameter { .. }
            | BridgeError::TopicMismatch { .. }
            | BridgeError::UnknownHandler(_)
            | BridgeError::InvalidMessageVariable { .. }
            | BridgeError::Configuration(_) => FaultClass::FatalConfig,
            BridgeError::Engine { .. } | BridgeError::Http(_) | BridgeError::Messaging(_) => {
                FaultClass::TransportFault
            }
            BridgeError::Serialization(_) => FaultClass::ValidationReject,
        }
    }

    /// True when the worker process must stop and wait for an operator
    pub fn is_fatal(&self) -> bool {
        self.fault_class() == FaultClass::FatalConfig
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Configuration(err.to_string())
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
