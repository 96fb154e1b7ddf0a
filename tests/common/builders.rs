//! Test data builders for claimed tasks, outcome envelopes and process
//! variable snapshots, plus wiring for bridges on in-memory providers.

#![allow(dead_code)] // Not every test binary uses every builder

use bpm_connector::camunda::{ClaimedTask, InMemoryExternalTaskService, VariableValue, Variables};
use bpm_connector::config::BridgeConfig;
use bpm_connector::connector::{InboundBridge, OutboundBridge};
use bpm_connector::messaging::providers::InMemoryBroker;
use bpm_connector::messaging::SessionPool;
use serde_json::{json, Map, Value};

pub const WORKER_ID: &str = "w1";
pub const PROCESS_INSTANCE_ID: &str = "pi-1";
pub const REPLY_QUEUE: &str = "rq";
pub const CORRELATION_ID: &str = "corr-1";

/// Configuration with a fixed worker id and fast loops
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.camunda.worker_id = Some(WORKER_ID.to_string());
    config.camunda.tick_interval_ms = 5;
    config.rabbitmq.reconnect_timeout_ms = 5;
    config
}

/// Builder for tasks as fetchAndLock returns them
pub struct TaskBuilder {
    task: ClaimedTask,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: ClaimedTask {
                id: id.to_string(),
                topic_name: "connector".to_string(),
                worker_id: None,
                process_definition_key: Some("shipping".to_string()),
                process_instance_id: Some(PROCESS_INSTANCE_ID.to_string()),
                retries: None,
                variables: Variables::new(),
            },
        }
    }

    pub fn topic(mut self, topic: &str) -> Self {
        self.task.topic_name = topic.to_string();
        self
    }

    pub fn retries(mut self, retries: i64) -> Self {
        self.task.retries = Some(retries);
        self
    }

    pub fn variable(mut self, name: &str, value: Value) -> Self {
        self.task
            .variables
            .insert(name.to_string(), VariableValue::new(value));
        self
    }

    /// `message` variable holding a serialized envelope
    pub fn message(mut self, envelope: Value) -> Self {
        self.task.variables.insert(
            "message".to_string(),
            VariableValue::json(envelope.to_string()),
        );
        self
    }

    /// The minimum a task needs to be publishable
    pub fn routable(self) -> Self {
        self.variable("command", json!("ship"))
            .variable("queue", json!("orders"))
    }

    pub fn build(self) -> ClaimedTask {
        self.task
    }
}

/// Builder for outcome envelopes a downstream worker publishes
pub struct OutcomeBuilder {
    headers: Map<String, Value>,
    data: Value,
}

impl OutcomeBuilder {
    /// Outcome for task `task_id` claimed by [`WORKER_ID`]
    pub fn for_task(task_id: &str) -> Self {
        let mut headers = Map::new();
        headers.insert("camundaWorkerId".to_string(), json!(WORKER_ID));
        headers.insert("camundaExternalTaskId".to_string(), json!(task_id));
        headers.insert("camundaProcessInstanceId".to_string(), json!(PROCESS_INSTANCE_ID));
        Self {
            headers,
            data: json!({}),
        }
    }

    pub fn success(self) -> Self {
        self.header("success", json!(true))
    }

    pub fn business_error(self, code: Option<&str>, message: &str) -> Self {
        let with_error = self
            .header("success", json!(false))
            .header("error", json!({"type": "business", "message": message}));
        match code {
            Some(code) => with_error.header("camundaErrorCode", json!(code)),
            None => with_error,
        }
    }

    pub fn system_error(self, message: &str) -> Self {
        self.header("success", json!(false))
            .header("error", json!({"type": "system", "message": message}))
    }

    pub fn retries(self, retries: Value) -> Self {
        self.header("camundaRetries", retries)
    }

    pub fn header(mut self, name: &str, value: Value) -> Self {
        self.headers.insert(name.to_string(), value);
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.shift_remove(name);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn json(self) -> Value {
        json!({"headers": Value::Object(self.headers), "data": self.data})
    }

    pub fn bytes(self) -> Vec<u8> {
        self.json().to_string().into_bytes()
    }
}

/// Process variables of a synchronously started instance
pub fn sync_snapshot() -> Variables {
    let mut snapshot = Variables::new();
    snapshot.insert(
        "rabbitCorrelationId".to_string(),
        VariableValue::new(CORRELATION_ID),
    );
    snapshot.insert(
        "rabbitCorrelationReplyTo".to_string(),
        VariableValue::new(REPLY_QUEUE),
    );
    snapshot.insert("orderId".to_string(), VariableValue::new(42));
    snapshot
}

pub fn async_snapshot() -> Variables {
    let mut snapshot = Variables::new();
    snapshot.insert("orderId".to_string(), VariableValue::new(42));
    snapshot
}

pub type TestInbound = InboundBridge<InMemoryExternalTaskService, SessionPool<InMemoryBroker>>;
pub type TestOutbound = OutboundBridge<InMemoryExternalTaskService, InMemoryBroker>;

pub fn inbound_bridge(
    engine: &InMemoryExternalTaskService,
    broker: &InMemoryBroker,
    config: &BridgeConfig,
) -> TestInbound {
    InboundBridge::new(engine.clone(), SessionPool::new(broker.clone()), config)
        .expect("valid topic binding")
}

pub fn outbound_bridge(
    engine: &InMemoryExternalTaskService,
    broker: &InMemoryBroker,
    config: &BridgeConfig,
) -> TestOutbound {
    OutboundBridge::new(engine.clone(), broker.clone(), config)
}
