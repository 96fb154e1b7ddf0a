//! Proptest strategies for outcome headers and task variables

#![allow(dead_code)]

use proptest::prelude::*;
use serde_json::{json, Value};

/// Values a downstream worker might put in `success`
pub fn success_flag_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(json!(true)),
        Just(json!(false)),
        Just(json!(1)),
        Just(json!(0)),
        Just(json!("true")),
        Just(json!("false")),
        Just(Value::Null),
    ]
}

pub fn error_type_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop_oneof![
        Just("business".to_string()),
        Just("system".to_string()),
        "[a-z]{1,10}",
    ])
}

/// `camundaRetries` as integers, numeric strings or garbage
pub fn retries_header_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-5i64..20).prop_map(Value::from),
        (0i64..20).prop_map(|n| Value::from(n.to_string())),
        Just(json!("many")),
        Just(Value::Null),
    ]
}

/// Task variable names, including every reserved parameter name
pub fn variable_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("command".to_string()),
        Just("queue".to_string()),
        Just("vhost".to_string()),
        Just("retries".to_string()),
        Just("retryTimeout".to_string()),
        Just("response_to".to_string()),
        Just("response_command".to_string()),
        Just("errorCode".to_string()),
        Just("errorRetries".to_string()),
        Just("message".to_string()),
        "[a-z][a-zA-Z0-9_]{0,15}",
    ]
}

pub fn variable_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{1,20}".prop_map(Value::from),
    ]
}
