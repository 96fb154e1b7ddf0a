//! # External Task Types
//!
//! Request and response bodies of the Camunda external-task REST API, and the
//! typed variable values tasks and process instances carry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::variable_types;

/// A typed process variable as the engine serializes it (`deserializeValues=false`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableValue {
    #[serde(default)]
    pub value: Value,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    #[serde(rename = "valueInfo", default, skip_serializing_if = "Option::is_none")]
    pub value_info: Option<Value>,
}

impl VariableValue {
    /// Untyped value; the engine infers the type
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            value_type: None,
            value_info: None,
        }
    }

    /// Serialized JSON document stored with type `Json`
    pub fn json(serialized: impl Into<String>) -> Self {
        Self {
            value: Value::String(serialized.into()),
            value_type: Some(variable_types::JSON.to_string()),
            value_info: None,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: Value::String(value.into()),
            value_type: Some(variable_types::STRING.to_string()),
            value_info: None,
        }
    }

    /// A variable holding `null` counts as not set
    pub fn is_set(&self) -> bool {
        !self.value.is_null()
    }
}

/// Variables keyed by name
pub type Variables = BTreeMap<String, VariableValue>;

/// A task claimed through fetchAndLock; read-only to the bridges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedTask {
    pub id: String,
    pub topic_name: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub process_definition_key: Option<String>,
    #[serde(default)]
    pub process_instance_id: Option<String>,
    /// `None` on the first attempt
    #[serde(default)]
    pub retries: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Variables,
}

impl ClaimedTask {
    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name).filter(|variable| variable.is_set())
    }

    pub fn process_definition_key(&self) -> &str {
        self.process_definition_key.as_deref().unwrap_or_default()
    }

    pub fn process_instance_id(&self) -> &str {
        self.process_instance_id.as_deref().unwrap_or_default()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRequest {
    pub topic_name: String,
    pub lock_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAndLockRequest {
    pub worker_id: String,
    pub max_tasks: u32,
    pub topics: Vec<TopicRequest>,
}

impl FetchAndLockRequest {
    /// Lock at most one task of a single topic
    pub fn single(worker_id: impl Into<String>, topic: impl Into<String>, lock_duration: u64) -> Self {
        Self {
            worker_id: worker_id.into(),
            max_tasks: 1,
            topics: vec![TopicRequest {
                topic_name: topic.into(),
                lock_duration,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub worker_id: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmnErrorRequest {
    pub worker_id: String,
    pub error_code: String,
    pub error_message: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRequest {
    pub worker_id: String,
    pub error_message: String,
    pub retries: i64,
    pub retry_timeout: i64,
}

/// Error body the engine returns with non-2xx answers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of a resolution call that reached the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    pub status: u16,
    pub error: Option<EngineErrorBody>,
}

impl EngineResponse {
    pub fn accepted(status: u16) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn rejected(status: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(EngineErrorBody {
                error_type: Some(error_type.into()),
                message: Some(message.into()),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Display for EngineResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Api return code <{}>", self.status)?;
        if let Some(EngineErrorBody {
            error_type: Some(error_type),
            message: Some(message),
        }) = &self.error
        {
            write!(f, " with error type <{error_type}> and message <{message}>")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claimed_task_decodes_engine_payload() {
        let task: ClaimedTask = serde_json::from_value(json!({
            "activityId": "ServiceTask_1",
            "id": "t1",
            "topicName": "connector",
            "workerId": "worker42",
            "processDefinitionKey": "shipping",
            "processInstanceId": "pi-1",
            "retries": null,
            "variables": {
                "command": {"type": "String", "value": "ship", "valueInfo": {}},
                "retries": {"type": "Integer", "value": 3, "valueInfo": {}}
            }
        }))
        .unwrap();

        assert_eq!(task.id, "t1");
        assert_eq!(task.retries, None);
        assert_eq!(task.process_instance_id(), "pi-1");
        assert_eq!(task.variable("command").unwrap().value, json!("ship"));
        assert_eq!(task.variables["retries"].value_type.as_deref(), Some("Integer"));
    }

    #[test]
    fn test_null_variables_decode_as_empty() {
        let task: ClaimedTask =
            serde_json::from_value(json!({"id": "t1", "topicName": "x", "variables": null}))
                .unwrap();
        assert!(task.variables.is_empty());
    }

    #[test]
    fn test_null_variable_counts_as_unset() {
        let task: ClaimedTask = serde_json::from_value(json!({
            "id": "t1",
            "topicName": "x",
            "variables": {"errorCode": {"type": "Null", "value": null}}
        }))
        .unwrap();
        assert!(task.variable("errorCode").is_none());
    }

    #[test]
    fn test_request_bodies_use_camel_case() {
        let fetch = FetchAndLockRequest::single("w1", "connector", 600_000);
        assert_eq!(
            serde_json::to_value(&fetch).unwrap(),
            json!({
                "workerId": "w1",
                "maxTasks": 1,
                "topics": [{"topicName": "connector", "lockDuration": 600000}]
            })
        );

        let failure = FailureRequest {
            worker_id: "w1".to_string(),
            error_message: "Request error".to_string(),
            retries: 2,
            retry_timeout: 5000,
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["retryTimeout"], 5000);
        assert_eq!(value["errorMessage"], "Request error");
    }

    #[test]
    fn test_json_variable_serialization() {
        let variable = VariableValue::json(r#"{"headers":{}}"#);
        assert_eq!(
            serde_json::to_value(&variable).unwrap(),
            json!({"value": "{\"headers\":{}}", "type": "Json"})
        );
    }

    #[test]
    fn test_engine_response_display() {
        let rejected = EngineResponse::rejected(500, "RestException", "Task is locked");
        assert!(!rejected.is_success());
        assert_eq!(
            rejected.to_string(),
            "Api return code <500> with error type <RestException> and message <Task is locked>"
        );
        assert!(EngineResponse::accepted(204).is_success());
    }
}
