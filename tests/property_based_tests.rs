mod common;

use bpm_connector::camunda::{ClaimedTask, VariableValue, Variables};
use bpm_connector::config::BridgeConfig;
use bpm_connector::connector::{classify, compose_envelope, ParameterRegistry, RetryBudget};
use bpm_connector::messaging::Envelope;
use common::strategies::*;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn outcome(success: Value, error_type: Option<String>, retries: Value) -> Envelope {
    let mut headers = Map::new();
    headers.insert("success".to_string(), success);
    if let Some(error_type) = error_type {
        headers.insert(
            "error".to_string(),
            json!({"type": error_type, "message": "boom"}),
        );
    }
    headers.insert("camundaRetries".to_string(), retries);
    Envelope::from_value(json!({"headers": Value::Object(headers), "data": {}})).unwrap()
}

proptest! {
    /// Property: classification depends only on the headers
    #[test]
    fn classification_is_deterministic(
        success in success_flag_strategy(),
        error_type in error_type_strategy(),
        retries in retries_header_strategy(),
    ) {
        let envelope = outcome(success, error_type, retries);
        let reencoded = Envelope::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(classify(&envelope), classify(&envelope));
        prop_assert_eq!(classify(&envelope), classify(&reencoded));
    }

    /// Property: the remaining budget is never negative and never exceeds retries - 1
    #[test]
    fn retry_budget_is_bounded(retries in retries_header_strategy()) {
        let envelope = outcome(json!(false), Some("system".to_string()), retries.clone());
        let budget = RetryBudget::from_headers(&envelope);
        prop_assert!(budget.remaining >= 0);

        let expected = match &retries {
            Value::Number(n) => (n.as_i64().unwrap() - 1).max(0),
            Value::String(s) => s.parse::<i64>().map_or(0, |n| (n - 1).max(0)),
            _ => 0,
        };
        prop_assert_eq!(budget.remaining, expected);
    }

    /// Property: composed envelopes carry task identity and never copy reserved names
    #[test]
    fn composed_envelopes_exclude_reserved_variables(
        extra in prop::collection::btree_map(
            variable_name_strategy().prop_filter("message holds the envelope", |name| name != "message"),
            variable_value_strategy(),
            0..12,
        ),
        task_id in "[a-z0-9-]{1,12}",
    ) {
        let mut variables: Variables = extra
            .iter()
            .map(|(name, value)| (name.clone(), VariableValue::new(value.clone())))
            .collect();
        variables.entry("command".to_string()).or_insert_with(|| VariableValue::new("ship"));
        variables.entry("queue".to_string()).or_insert_with(|| VariableValue::new("orders"));

        let task = ClaimedTask {
            id: task_id.clone(),
            topic_name: "connector".to_string(),
            worker_id: None,
            process_definition_key: Some("shipping".to_string()),
            process_instance_id: Some("pi-1".to_string()),
            retries: None,
            variables,
        };

        let registry = ParameterRegistry::standard(&BridgeConfig::default());
        let resolved = registry.resolve(&task).unwrap();
        let outgoing = compose_envelope(&task, &resolved, &registry, "w1").unwrap();

        prop_assert_eq!(outgoing.envelope.header_text("camundaExternalTaskId"), Some(task_id));
        prop_assert_eq!(outgoing.envelope.header_text("camundaProcessInstanceId"), Some("pi-1".to_string()));
        prop_assert_eq!(outgoing.envelope.header_text("camundaWorkerId"), Some("w1".to_string()));

        let copied = outgoing.envelope.parameters().cloned().unwrap_or_default();
        for name in copied.keys() {
            prop_assert!(!registry.is_reserved(name), "{} was copied", name);
        }
        for (name, value) in &extra {
            if !registry.is_reserved(name) {
                prop_assert_eq!(copied.get(name), Some(value));
            }
        }
    }
}
