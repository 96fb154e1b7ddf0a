//! # Outbound Bridge
//!
//! Consumes outcome envelopes from the outbound queue and resolves the
//! external task each one refers to: complete it, raise a BPMN error, or
//! report a failure with the remaining retry budget. Tasks started by a
//! synchronous caller get exactly one correlated reply per outcome.
//!
//! ## Message lifecycle
//!
//! ```text
//! Received ──decode/validate──▶ Classified ──engine call──▶ Resolved ──▶ ack
//!     │                             │
//!     └──▶ Rejected (ack)           └──▶ Aborted (nack, no requeue)
//! ```
//!
//! A message is acknowledged only after its engine call returned, so a crash
//! mid-resolution leads to redelivery rather than loss.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::classifier::{classify, Classification, RetryBudget};
use super::correlation::{send_reply, ReplyPayload, ReplyTarget};
use crate::camunda::{
    BpmnErrorRequest, CompleteRequest, EngineResponse, ExternalTaskService, FailureRequest,
    VariableValue, Variables,
};
use crate::config::BridgeConfig;
use crate::constants::{headers, messages, owners, variables};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{log_bridge_operation, log_error};
use crate::messaging::{
    BrokerConnector, BrokerSession, Envelope, MessageConsumer, MessagePublisher, MessagingError,
    MessagingResult,
};
use crate::shutdown::ShutdownSignal;

/// Terminal state of one outcome message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Completion attempted; `engine_accepted` is false when the engine refused
    /// or could not be reached
    Completed { engine_accepted: bool },
    BusinessErrored,
    SystemFailed { remaining: i64 },
    /// Structurally invalid message, dropped
    Rejected { reason: String },
    /// Resolvable message the process definition cannot route
    Aborted { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    Reject,
}

impl Resolution {
    pub fn ack_decision(&self) -> AckDecision {
        match self {
            Resolution::Aborted { .. } => AckDecision::Reject,
            _ => AckDecision::Ack,
        }
    }
}

/// Per-message state threaded through one resolution
struct ResolutionContext {
    envelope: Envelope,
    task_id: String,
    worker_id: String,
    snapshot: Variables,
    reply: Option<ReplyTarget>,
    reply_sent: bool,
}

impl ResolutionContext {
    /// Process variables sent with the resolution: the snapshot plus the
    /// outcome envelope as the `message` variable
    fn updated_variables(&self) -> BridgeResult<Variables> {
        let mut updated = self.snapshot.clone();
        updated.insert(
            variables::MESSAGE.to_string(),
            VariableValue::json(self.envelope.to_json_string()?),
        );
        Ok(updated)
    }

    /// At most one reply per message, and only for synchronous tasks
    async fn reply<P>(&mut self, publisher: &P, payload: ReplyPayload)
    where
        P: MessagePublisher + ?Sized,
    {
        let Some(target) = self.reply.as_ref() else {
            return;
        };
        if self.reply_sent {
            return;
        }
        self.reply_sent = true;

        match send_reply(publisher, target, &payload).await {
            Ok(()) => debug!(
                task_id = %self.task_id,
                reply_to = %target.reply_to,
                correlation_id = %target.correlation_id,
                "Sent synchronous reply"
            ),
            Err(e) => log_error(
                owners::CONNECTOR_OUT,
                "reply",
                &e.to_string(),
                Some(&format!("task <{}> reply_to <{}>", self.task_id, target.reply_to)),
            ),
        }
    }
}

enum LoopExit {
    Shutdown,
    Quit,
}

pub struct OutboundBridge<E, C> {
    engine: E,
    connector: C,
    queue: String,
    prefetch: u16,
    reconnect_backoff: Duration,
}

impl<E, C> OutboundBridge<E, C>
where
    E: ExternalTaskService,
    C: BrokerConnector,
{
    pub fn new(engine: E, connector: C, config: &BridgeConfig) -> Self {
        Self {
            engine,
            connector,
            queue: config.rabbitmq.queue_out.clone(),
            prefetch: config.rabbitmq.prefetch_count.max(1),
            reconnect_backoff: config.rabbitmq.reconnect_timeout(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Resolve one outcome message. Never fails: every problem ends in a
    /// [`Resolution`] that decides how the delivery is acknowledged.
    pub async fn on_message<P>(&self, payload: &[u8], replies: &P) -> Resolution
    where
        P: MessagePublisher + ?Sized,
    {
        debug!(
            queue = %self.queue,
            body = %String::from_utf8_lossy(payload),
            "Received outcome message"
        );

        let mut envelope = match Envelope::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => return self.reject(format!("undecodable envelope: {e}")),
        };

        let missing: Vec<&str> = headers::REQUIRED_OUTCOME
            .iter()
            .copied()
            .filter(|name| envelope.header_id(name).is_none())
            .collect();
        let (Some(task_id), Some(worker_id)) = (
            envelope.header_id(headers::EXTERNAL_TASK_ID),
            envelope.header_id(headers::WORKER_ID),
        ) else {
            return self.reject(format!("missing headers: {}", missing.join(", ")));
        };

        let snapshot = self.fetch_snapshot(&envelope, &task_id).await;
        let reply = ReplyTarget::from_snapshot(&snapshot);

        if let Some(counter) = envelope.header_i64(headers::ERROR_COUNTER) {
            envelope.set_header(headers::ERROR_COUNTER, counter.saturating_sub(1));
        }

        let classification = classify(&envelope);
        debug!(
            task_id = %task_id,
            classification = classification.kind(),
            synchronous = reply.is_some(),
            "Classified outcome"
        );

        let mut context = ResolutionContext {
            envelope,
            task_id,
            worker_id,
            snapshot,
            reply,
            reply_sent: false,
        };

        match classification {
            Classification::Completion => self.resolve_completion(&mut context, replies).await,
            Classification::BusinessError {
                error_code: Some(error_code),
                message,
            } => {
                self.resolve_business_error(&mut context, replies, error_code, message)
                    .await
            }
            Classification::BusinessError {
                error_code: None, ..
            } => {
                let reason = format!(
                    "`{}` not set for task <{}>",
                    headers::ERROR_CODE,
                    context.task_id
                );
                log_error(owners::CONNECTOR_OUT, "handle_error", &reason, None);
                Resolution::Aborted { reason }
            }
            Classification::SystemFailure { message } => {
                self.resolve_system_failure(&mut context, replies, message)
                    .await
            }
        }
    }

    fn reject(&self, reason: String) -> Resolution {
        warn!(queue = %self.queue, reason = %reason, "Rejected outcome message");
        log_bridge_operation(
            owners::CONNECTOR_OUT,
            "validate",
            Some(&self.queue),
            "rejected",
            Some(&reason),
        );
        Resolution::Rejected { reason }
    }

    /// Variables of the task's process instance; empty when they cannot be read
    async fn fetch_snapshot(&self, envelope: &Envelope, task_id: &str) -> Variables {
        let Some(process_instance_id) = envelope.header_id(headers::PROCESS_INSTANCE_ID) else {
            warn!(task_id = %task_id, "Outcome carries no process instance id, treating as asynchronous");
            return Variables::new();
        };
        match self.engine.get_variables(&process_instance_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log_error(
                    owners::CONNECTOR_OUT,
                    "get_variables",
                    &e.to_string(),
                    Some(&format!("process instance <{process_instance_id}> task <{task_id}>")),
                );
                Variables::new()
            }
        }
    }

    async fn resolve_completion<P>(&self, context: &mut ResolutionContext, replies: &P) -> Resolution
    where
        P: MessagePublisher + ?Sized,
    {
        context.envelope.remove_header(headers::ERROR_COUNTER);
        let request = match context.updated_variables() {
            Ok(variables) => CompleteRequest {
                worker_id: context.worker_id.clone(),
                variables,
            },
            Err(e) => return self.reject(e.to_string()),
        };

        let outcome = self.engine.complete(&context.task_id, &request).await;
        match outcome {
            Ok(response) if response.is_success() => {
                context.reply(replies, ReplyPayload::Success).await;
                log_bridge_operation(
                    owners::CONNECTOR_OUT,
                    "complete",
                    Some(&self.queue),
                    "success",
                    Some(&format!("Task <{}> completed", context.task_id)),
                );
                Resolution::Completed {
                    engine_accepted: true,
                }
            }
            refused => {
                log_error(
                    owners::CONNECTOR_OUT,
                    "complete",
                    &describe(&refused),
                    Some(&format!("task <{}>", context.task_id)),
                );
                context
                    .reply(replies, ReplyPayload::Error(messages::REQUEST_ERROR.to_string()))
                    .await;
                Resolution::Completed {
                    engine_accepted: false,
                }
            }
        }
    }

    async fn resolve_business_error<P>(
        &self,
        context: &mut ResolutionContext,
        replies: &P,
        error_code: String,
        message: String,
    ) -> Resolution
    where
        P: MessagePublisher + ?Sized,
    {
        let mut updated = match context.updated_variables() {
            Ok(updated) => updated,
            Err(e) => return self.reject(e.to_string()),
        };
        if let Some(counter) = context.envelope.header_i64(headers::ERROR_COUNTER) {
            updated.insert(
                variables::ERROR_COUNTER.to_string(),
                VariableValue::string(counter.to_string()),
            );
        }

        let request = BpmnErrorRequest {
            worker_id: context.worker_id.clone(),
            error_code: error_code.clone(),
            error_message: message.clone(),
            variables: updated,
        };
        let outcome = self.engine.handle_error(&context.task_id, &request).await;
        self.log_resolution("handle_error", &context.task_id, &outcome);

        context.reply(replies, ReplyPayload::Error(message.clone())).await;
        log_bridge_operation(
            owners::CONNECTOR_OUT,
            "handle_error",
            Some(&self.queue),
            "business_error",
            Some(&format!(
                "Task <{}> raised <{}>: {}",
                context.task_id, error_code, message
            )),
        );
        Resolution::BusinessErrored
    }

    async fn resolve_system_failure<P>(
        &self,
        context: &mut ResolutionContext,
        replies: &P,
        message: String,
    ) -> Resolution
    where
        P: MessagePublisher + ?Sized,
    {
        let budget = RetryBudget::from_headers(&context.envelope);

        // no retry follows, so this is the caller's only answer
        if budget.is_exhausted() {
            context
                .reply(replies, ReplyPayload::Error(messages::REQUEST_ERROR.to_string()))
                .await;
        }

        let request = FailureRequest {
            worker_id: context.worker_id.clone(),
            error_message: messages::REQUEST_ERROR.to_string(),
            retries: budget.remaining,
            retry_timeout: budget.retry_timeout,
        };
        let outcome = self.engine.handle_failure(&context.task_id, &request).await;
        self.log_resolution("handle_failure", &context.task_id, &outcome);

        log_bridge_operation(
            owners::CONNECTOR_OUT,
            "handle_failure",
            Some(&self.queue),
            "system_failure",
            Some(&format!(
                "Task <{}> failed with {} retries left: {}",
                context.task_id, budget.remaining, message
            )),
        );
        Resolution::SystemFailed {
            remaining: budget.remaining,
        }
    }

    fn log_resolution(
        &self,
        operation: &str,
        task_id: &str,
        outcome: &BridgeResult<EngineResponse>,
    ) {
        if !matches!(outcome, Ok(response) if response.is_success()) {
            log_error(
                owners::CONNECTOR_OUT,
                operation,
                &describe(outcome),
                Some(&format!("task <{task_id}>")),
            );
        }
    }

    /// Consume until shutdown or a `quit` message, reconnecting after every
    /// broker fault
    pub async fn run(&self, shutdown: ShutdownSignal) -> BridgeResult<()> {
        info!(queue = %self.queue, prefetch = self.prefetch, "🚀 Outbound bridge started");

        while !shutdown.is_triggered() {
            match self.consume_session(&shutdown).await {
                Ok(LoopExit::Shutdown) => break,
                Ok(LoopExit::Quit) => {
                    info!(queue = %self.queue, "Received quit message");
                    break;
                }
                Err(e) => {
                    let error = BridgeError::from(e);
                    warn!(
                        fault = %error.fault_class(),
                        error = %error,
                        backoff_ms = self.reconnect_backoff.as_millis() as u64,
                        "Broker connection lost, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_backoff) => {}
                        _ = shutdown.wait() => {}
                    }
                }
            }
        }

        info!(queue = %self.queue, "🛑 Outbound bridge stopped");
        Ok(())
    }

    async fn consume_session(&self, shutdown: &ShutdownSignal) -> MessagingResult<LoopExit> {
        let session = self.connector.connect(self.connector.default_vhost()).await?;
        let result = self.drain(&session, shutdown).await;
        session.close().await;
        result
    }

    async fn drain(&self, session: &C::Session, shutdown: &ShutdownSignal) -> MessagingResult<LoopExit> {
        let mut consumer = session.consume(&self.queue, self.prefetch).await?;
        loop {
            let next = tokio::select! {
                _ = shutdown.wait() => return Ok(LoopExit::Shutdown),
                next = consumer.next_delivery() => next?,
            };
            let Some(delivery) = next else {
                return Err(MessagingError::consumer_closed(self.queue.clone()));
            };

            if delivery.body_text().trim() == messages::QUIT {
                consumer.ack(&delivery).await?;
                return Ok(LoopExit::Quit);
            }

            let resolution = self.on_message(&delivery.payload, session).await;
            debug!(
                delivery_tag = delivery.receipt_handle.delivery_tag(),
                resolution = ?resolution,
                "Resolved outcome message"
            );
            match resolution.ack_decision() {
                AckDecision::Ack => consumer.ack(&delivery).await?,
                AckDecision::Reject => consumer.nack(&delivery, false).await?,
            }
        }
    }
}

fn describe(outcome: &BridgeResult<EngineResponse>) -> String {
    match outcome {
        Ok(response) => response.to_string(),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_aborted_messages_are_rejected() {
        assert_eq!(
            Resolution::Aborted {
                reason: "x".to_string()
            }
            .ack_decision(),
            AckDecision::Reject
        );
        for resolution in [
            Resolution::Completed {
                engine_accepted: false,
            },
            Resolution::BusinessErrored,
            Resolution::SystemFailed { remaining: 0 },
            Resolution::Rejected {
                reason: "x".to_string(),
            },
        ] {
            assert_eq!(resolution.ack_decision(), AckDecision::Ack);
        }
    }

    #[test]
    fn test_describe_engine_outcomes() {
        let refused: BridgeResult<EngineResponse> =
            Ok(EngineResponse::rejected(404, "RestException", "gone"));
        assert_eq!(
            describe(&refused),
            "Api return code <404> with error type <RestException> and message <gone>"
        );
        let unreachable: BridgeResult<EngineResponse> =
            Err(BridgeError::engine("complete", "timeout"));
        assert!(describe(&unreachable).contains("timeout"));
    }
}
