//! # Connector Constants
//!
//! Header names, process-variable names and fixed texts shared by the inbound
//! and outbound bridges. Downstream workers depend on the exact header names,
//! so they are defined once here.

/// Envelope header keys
pub mod headers {
    pub const COMMAND: &str = "command";
    pub const QUEUE: &str = "queue";
    pub const VHOST: &str = "vhost";
    pub const EXTERNAL_TASK_ID: &str = "camundaExternalTaskId";
    pub const PROCESS_INSTANCE_ID: &str = "camundaProcessInstanceId";
    pub const PROCESS_KEY: &str = "camundaProcessKey";
    pub const WORKER_ID: &str = "camundaWorkerId";
    pub const RETRIES: &str = "camundaRetries";
    pub const RETRY_TIMEOUT: &str = "camundaRetryTimeout";
    pub const ERROR_CODE: &str = "camundaErrorCode";
    pub const ERROR_COUNTER: &str = "camundaErrorCounter";
    pub const RESPONSE_TO: &str = "response_to";
    pub const RESPONSE_COMMAND: &str = "response_command";
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";

    /// Headers an outcome message must carry to be resolvable
    pub const REQUIRED_OUTCOME: [&str; 2] = [WORKER_ID, EXTERNAL_TASK_ID];
}

/// Process variable names
pub mod variables {
    /// Variable carrying the serialized envelope between bridge passes
    pub const MESSAGE: &str = "message";
    pub const ERROR_COUNTER: &str = "errorCounter";
    pub const CORRELATION_ID: &str = "rabbitCorrelationId";
    pub const CORRELATION_REPLY_TO: &str = "rabbitCorrelationReplyTo";
}

/// Parameter descriptor names read from claimed task variables
pub mod parameters {
    pub const COMMAND: &str = "command";
    pub const QUEUE: &str = "queue";
    pub const VHOST: &str = "vhost";
    pub const RETRIES: &str = "retries";
    pub const RETRY_TIMEOUT: &str = "retryTimeout";
    pub const RESPONSE_TO: &str = "response_to";
    pub const RESPONSE_COMMAND: &str = "response_command";
    pub const ERROR_CODE: &str = "errorCode";
    pub const ERROR_RETRIES: &str = "errorRetries";
}

/// Camunda variable type names
pub mod variable_types {
    pub const JSON: &str = "Json";
    pub const STRING: &str = "String";
}

/// Fixed texts reported to the engine and to synchronous callers
pub mod messages {
    /// Failure reason sent with every system failure and refused completion
    pub const REQUEST_ERROR: &str = "Request error";
    pub const UNKNOWN_ERROR: &str = "Unknown error";
    /// Body that stops the outbound consume loop
    pub const QUIT: &str = "quit";
}

/// Log owners, one per process kind
pub mod owners {
    pub const CONNECTOR_IN: &str = "bpm-connector-in";
    pub const CONNECTOR_OUT: &str = "bpm-connector-out";
    pub const CONSUMER: &str = "bpm-consumer";
}

/// Error type classification values found in `headers.error.type`
pub mod error_types {
    pub const BUSINESS: &str = "business";
    pub const SYSTEM: &str = "system";
}
