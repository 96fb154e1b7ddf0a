//! # Inbound Bridge
//!
//! Claims external tasks from the process engine one at a time, turns each
//! into an [`Envelope`] and publishes it durably to the queue its `queue`
//! parameter names.
//!
//! ## Crash recovery
//!
//! Nothing is persisted locally. A task that is claimed but never published
//! keeps its engine lock until it expires and is then claimed again, so a
//! downstream worker may see the same task twice.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::parameters::{ParameterRegistry, ResolvedParameters};
use super::topic::{TaskHandlerKind, TopicBinding};
use crate::camunda::{ClaimedTask, ExternalTaskService, FetchAndLockRequest};
use crate::config::BridgeConfig;
use crate::constants::{headers, owners, parameters, variables};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{log_bridge_operation, log_error};
use crate::messaging::envelope::value_as_text;
use crate::messaging::{Envelope, MessagePublisher, PublishOptions, QueueTarget};
use crate::shutdown::ShutdownSignal;

/// An envelope ready to publish and where it goes
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEnvelope {
    pub target: QueueTarget,
    pub envelope: Envelope,
}

/// Build the envelope for a claimed task from its resolved parameters.
///
/// Pure: no I/O, so the header contract can be checked without an engine
/// or a broker.
pub fn compose_envelope(
    task: &ClaimedTask,
    resolved: &ResolvedParameters,
    registry: &ParameterRegistry,
    worker_id: &str,
) -> BridgeResult<OutgoingEnvelope> {
    let mut envelope = decode_message_variable(task)?;

    envelope.set_header(headers::EXTERNAL_TASK_ID, task.id.clone());
    envelope.set_header(headers::PROCESS_INSTANCE_ID, task.process_instance_id());
    envelope.set_header(headers::WORKER_ID, worker_id);

    let retries = task
        .retries
        .map(Value::from)
        .or_else(|| resolved.get(parameters::RETRIES).cloned())
        .unwrap_or(Value::Null);
    envelope.set_header(headers::RETRIES, retries);
    envelope.set_header(
        headers::RETRY_TIMEOUT,
        resolved
            .get(parameters::RETRY_TIMEOUT)
            .cloned()
            .unwrap_or(Value::Null),
    );

    if let Some(code) = resolved.get(parameters::ERROR_CODE) {
        envelope.set_header(headers::ERROR_CODE, code.clone());
    }
    // an in-flight counter from a previous pass is never reset
    if let Some(budget) = resolved.get(parameters::ERROR_RETRIES) {
        if !envelope.has_header(headers::ERROR_COUNTER) {
            envelope.set_header(headers::ERROR_COUNTER, budget.clone());
        }
    }

    let queue = text_parameter(task, resolved, parameters::QUEUE)?;
    let vhost = text_parameter(task, resolved, parameters::VHOST)?;
    envelope.set_header(
        headers::COMMAND,
        resolved.get(parameters::COMMAND).cloned().unwrap_or(Value::Null),
    );
    envelope.set_header(headers::QUEUE, queue.clone());
    envelope.set_header(headers::VHOST, vhost.clone());

    for (name, header) in [
        (parameters::RESPONSE_TO, headers::RESPONSE_TO),
        (parameters::RESPONSE_COMMAND, headers::RESPONSE_COMMAND),
    ] {
        if let Some(value) = resolved.get(name) {
            envelope.set_header(header, value.clone());
        }
    }

    let copied = envelope.parameters_mut();
    for (name, variable) in &task.variables {
        if !registry.is_reserved(name) {
            copied.insert(name.clone(), variable.value.clone());
        }
    }

    Ok(OutgoingEnvelope {
        target: QueueTarget::on_vhost(vhost, queue),
        envelope,
    })
}

fn decode_message_variable(task: &ClaimedTask) -> BridgeResult<Envelope> {
    let Some(message) = task.variable(variables::MESSAGE) else {
        return Ok(Envelope::new());
    };
    let decoded = match &message.value {
        Value::String(text) => Envelope::from_json_str(text),
        Value::Object(_) => Envelope::from_value(message.value.clone()),
        other => {
            return Err(BridgeError::InvalidMessageVariable {
                task_id: task.id.clone(),
                reason: format!("expected a JSON document, found {other}"),
            })
        }
    };
    decoded.map_err(|e| BridgeError::InvalidMessageVariable {
        task_id: task.id.clone(),
        reason: e.to_string(),
    })
}

fn text_parameter(
    task: &ClaimedTask,
    resolved: &ResolvedParameters,
    name: &str,
) -> BridgeResult<String> {
    resolved
        .get(name)
        .and_then(value_as_text)
        .ok_or_else(|| BridgeError::InvalidParameter {
            name: name.to_string(),
            task_id: task.id.clone(),
            reason: "expected a non-empty name".to_string(),
        })
}

pub struct InboundBridge<E, P> {
    engine: E,
    publisher: P,
    registry: ParameterRegistry,
    binding: TopicBinding,
    worker_id: String,
    lock_duration_ms: u64,
    tick: Duration,
}

impl<E, P> InboundBridge<E, P>
where
    E: ExternalTaskService,
    P: MessagePublisher,
{
    /// Fails with a fatal error when the topic binding is invalid
    pub fn new(engine: E, publisher: P, config: &BridgeConfig) -> BridgeResult<Self> {
        Ok(Self {
            engine,
            publisher,
            registry: ParameterRegistry::standard(config),
            binding: TopicBinding::from_config(&config.camunda)?,
            worker_id: config.camunda.worker_id(),
            lock_duration_ms: config.camunda.lock_duration_ms,
            tick: config.camunda.tick_interval(),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run the handler bound to the task's topic
    pub async fn handle_task(&self, task: &ClaimedTask) -> BridgeResult<()> {
        match self.binding.handler_for(task)? {
            TaskHandlerKind::PublishEnvelope => self.publish_envelope(task).await,
        }
    }

    async fn publish_envelope(&self, task: &ClaimedTask) -> BridgeResult<()> {
        let context = format!(
            "topic <{}> task <{}> of process <{}> process instance <{}>",
            task.topic_name,
            task.id,
            task.process_definition_key(),
            task.process_instance_id()
        );
        log_bridge_operation(
            owners::CONNECTOR_IN,
            "fetch_and_lock",
            None,
            "success",
            Some(&format!("Fetched and locked from {context}")),
        );

        let resolved = self.registry.resolve(task)?;
        let outgoing = compose_envelope(task, &resolved, &self.registry, &self.worker_id)?;
        let body = outgoing.envelope.to_bytes()?;

        self.publisher
            .publish(&outgoing.target, &body, &PublishOptions::persistent())
            .await?;

        log_bridge_operation(
            owners::CONNECTOR_IN,
            "publish",
            Some(&outgoing.target.queue),
            "success",
            Some(&format!("Published envelope for {context}")),
        );
        Ok(())
    }

    /// One fetch cycle; returns how many tasks were handled
    pub async fn poll_once(&self) -> BridgeResult<usize> {
        let request = FetchAndLockRequest::single(
            self.worker_id.clone(),
            self.binding.topic(),
            self.lock_duration_ms,
        );
        let tasks = self.engine.fetch_and_lock(&request).await?;
        if tasks.is_empty() {
            debug!(topic = %self.binding.topic(), "No task to lock");
        }
        for task in &tasks {
            self.handle_task(task).await?;
        }
        Ok(tasks.len())
    }

    /// Poll until shutdown; returns the first fatal error
    pub async fn run(&self, shutdown: ShutdownSignal) -> BridgeResult<()> {
        info!(
            worker_id = %self.worker_id,
            topic = %self.binding.topic(),
            handler = %self.binding.handler(),
            tick_ms = self.tick.as_millis() as u64,
            "🚀 Inbound bridge started"
        );

        while !shutdown.is_triggered() {
            match self.poll_once().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    log_error(owners::CONNECTOR_IN, "handle_task", &e.to_string(), None);
                    return Err(e);
                }
                Err(e) => {
                    warn!(fault = %e.fault_class(), error = %e, "Fetch cycle failed, retrying next tick");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                _ = shutdown.wait() => {}
            }
        }

        info!(worker_id = %self.worker_id, "🛑 Inbound bridge stopped");
        Ok(())
    }
}
