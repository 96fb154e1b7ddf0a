//! # Topic Binding
//!
//! Each inbound worker serves exactly one topic, bound to one handler from a
//! closed set. The binding is resolved and validated when the worker starts;
//! a claimed task from any other topic is a deployment mistake.

use std::fmt;
use std::str::FromStr;

use crate::camunda::ClaimedTask;
use crate::config::CamundaConfig;
use crate::error::{BridgeError, BridgeResult};

/// Handlers a topic can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskHandlerKind {
    /// Build an envelope from the task and publish it to its queue
    PublishEnvelope,
}

impl FromStr for TaskHandlerKind {
    type Err = BridgeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "publish_envelope" | "rabbitmq" => Ok(TaskHandlerKind::PublishEnvelope),
            _ => Err(BridgeError::UnknownHandler(name.to_string())),
        }
    }
}

impl fmt::Display for TaskHandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskHandlerKind::PublishEnvelope => f.write_str("publish_envelope"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBinding {
    topic: String,
    handler: TaskHandlerKind,
}

impl TopicBinding {
    pub fn new(topic: impl Into<String>, handler: TaskHandlerKind) -> Self {
        Self {
            topic: topic.into(),
            handler,
        }
    }

    pub fn from_config(config: &CamundaConfig) -> BridgeResult<Self> {
        if config.topic.trim().is_empty() {
            return Err(BridgeError::configuration("camunda.topic must not be empty"));
        }
        Ok(Self::new(config.topic.clone(), config.handler.parse()?))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn handler(&self) -> TaskHandlerKind {
        self.handler
    }

    /// Handler for a claimed task, or `TopicMismatch`
    pub fn handler_for(&self, task: &ClaimedTask) -> BridgeResult<TaskHandlerKind> {
        if task.topic_name == self.topic {
            Ok(self.handler)
        } else {
            Err(BridgeError::TopicMismatch {
                task_id: task.id.clone(),
                expected: self.topic.clone(),
                actual: task.topic_name.clone(),
            })
        }
    }
}
