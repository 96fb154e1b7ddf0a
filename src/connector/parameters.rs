//! # Task Parameters
//!
//! Declarative description of the task variables the inbound bridge reads
//! into envelope headers. The registry is evaluated fresh for every claimed
//! task; the reserved-key set (every descriptor name plus `message`) is
//! computed once and decides which variables are copied to `data.parameters`.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::camunda::ClaimedTask;
use crate::config::BridgeConfig;
use crate::constants::{parameters, variables};
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Option<Value>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    descriptors: Vec<ParameterDescriptor>,
    reserved: HashSet<String>,
}

impl ParameterRegistry {
    pub fn new(descriptors: Vec<ParameterDescriptor>) -> Self {
        let reserved = descriptors
            .iter()
            .map(|descriptor| descriptor.name.clone())
            .chain(std::iter::once(variables::MESSAGE.to_string()))
            .collect();
        Self {
            descriptors,
            reserved,
        }
    }

    /// The connector's parameter set; optional defaults come from configuration
    pub fn standard(config: &BridgeConfig) -> Self {
        Self::new(vec![
            ParameterDescriptor::required(parameters::COMMAND),
            ParameterDescriptor::required(parameters::QUEUE),
            ParameterDescriptor::optional(
                parameters::VHOST,
                Some(Value::from(config.rabbitmq.vhost.clone())),
            ),
            ParameterDescriptor::optional(
                parameters::RETRIES,
                Some(Value::from(config.camunda.retries)),
            ),
            ParameterDescriptor::optional(
                parameters::RETRY_TIMEOUT,
                Some(Value::from(config.camunda.retry_timeout_ms)),
            ),
            ParameterDescriptor::optional(
                parameters::RESPONSE_TO,
                Some(Value::from(config.rabbitmq.queue_out.clone())),
            ),
            ParameterDescriptor::optional(parameters::RESPONSE_COMMAND, None),
            ParameterDescriptor::optional(parameters::ERROR_CODE, None),
            ParameterDescriptor::optional(parameters::ERROR_RETRIES, None),
        ])
    }

    pub fn descriptors(&self) -> &[ParameterDescriptor] {
        &self.descriptors
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Evaluate every descriptor against the task's variables.
    ///
    /// A variable holding `null` counts as absent. The first absent required
    /// parameter fails the whole task.
    pub fn resolve(&self, task: &ClaimedTask) -> BridgeResult<ResolvedParameters> {
        let mut values = HashMap::new();
        for descriptor in &self.descriptors {
            match task.variable(&descriptor.name) {
                Some(variable) => {
                    values.insert(descriptor.name.clone(), variable.value.clone());
                }
                None if descriptor.required => {
                    return Err(BridgeError::MissingParameter {
                        name: descriptor.name.clone(),
                        task_id: task.id.clone(),
                        topic: task.topic_name.clone(),
                        process_definition_key: task.process_definition_key().to_string(),
                        process_instance_id: task.process_instance_id().to_string(),
                    });
                }
                None => {
                    if let Some(default) = descriptor.default.as_ref().filter(|d| !d.is_null()) {
                        values.insert(descriptor.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(ResolvedParameters { values })
    }
}

/// Parameter values for one task; names without a value are absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    values: HashMap<String, Value>,
}

impl ResolvedParameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}
