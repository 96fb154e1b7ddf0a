//! Inbound bridge against the in-memory engine and broker

mod common;

use std::time::Duration;

use bpm_connector::camunda::{EngineCall, InMemoryExternalTaskService};
use bpm_connector::messaging::providers::InMemoryBroker;
use bpm_connector::shutdown;
use bpm_connector::BridgeError;
use common::*;
use serde_json::json;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_publishes_envelope_with_parameter_headers() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    engine.push_task(
        TaskBuilder::new("t1")
            .variable("command", json!("ship"))
            .variable("queue", json!("orders"))
            .variable("retries", json!(3))
            .variable("retryTimeout", json!(5000))
            .build(),
    );

    assert_eq!(assert_ok!(bridge.poll_once().await), 1);

    let published = broker.published_to("orders");
    assert_eq!(published.len(), 1);
    assert!(published[0].options.persistent);
    assert_eq!(published[0].vhost, "/");

    let envelope = published[0].json();
    let headers = &envelope["headers"];
    assert_eq!(headers["command"], json!("ship"));
    assert_eq!(headers["queue"], json!("orders"));
    assert_eq!(headers["camundaRetries"], json!(3));
    assert_eq!(headers["camundaRetryTimeout"], json!(5000));
    assert_eq!(headers["camundaExternalTaskId"], json!("t1"));
    assert_eq!(headers["camundaProcessInstanceId"], json!(PROCESS_INSTANCE_ID));
    assert_eq!(headers["camundaWorkerId"], json!(WORKER_ID));
    assert_eq!(headers["response_to"], json!("bpm_out"));
    assert!(headers.get("camundaErrorCode").is_none());
    assert!(headers.get("response_command").is_none());
    assert_eq!(envelope["data"]["parameters"], json!({}));
}

#[tokio::test]
async fn test_fetch_requests_single_lock_on_configured_topic() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let config = test_config();
    let bridge = inbound_bridge(&engine, &broker, &config);

    assert_eq!(assert_ok!(bridge.poll_once().await), 0);

    match &engine.calls()[0] {
        EngineCall::FetchAndLock(request) => {
            assert_eq!(request.max_tasks, 1);
            assert_eq!(request.worker_id, WORKER_ID);
            assert_eq!(request.topics[0].topic_name, "connector");
            assert_eq!(request.topics[0].lock_duration, config.camunda.lock_duration_ms);
        }
        other => panic!("unexpected first call: {other:?}"),
    }
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_missing_required_parameter_publishes_nothing() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    engine.push_task(
        TaskBuilder::new("t1")
            .variable("command", json!("ship"))
            .build(),
    );

    let err = bridge.poll_once().await.unwrap_err();
    assert!(matches!(err, BridgeError::MissingParameter { ref name, .. } if name == "queue"));
    assert!(err.is_fatal());
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_run_stops_on_fatal_error() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());
    engine.push_task(TaskBuilder::new("t1").build());

    let (_trigger, signal) = shutdown::channel();
    let result = tokio::time::timeout(Duration::from_secs(5), bridge.run(signal))
        .await
        .expect("bridge stops by itself");

    assert!(result.unwrap_err().is_fatal());
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_foreign_topic_is_fatal() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    let task = TaskBuilder::new("t1").topic("billing").routable().build();
    let err = bridge.handle_task(&task).await.unwrap_err();
    assert!(matches!(err, BridgeError::TopicMismatch { .. }));
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn test_run_survives_engine_outage() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    engine.fail_next_fetches(2);
    engine.push_task(TaskBuilder::new("t1").routable().build());

    let (trigger, signal) = shutdown::channel();
    let watcher = broker.clone();
    let stopper = tokio::spawn(async move {
        for _ in 0..500 {
            if !watcher.published_to("orders").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        trigger.trigger();
    });

    tokio::time::timeout(Duration::from_secs(5), bridge.run(signal))
        .await
        .expect("bridge stops on shutdown")
        .unwrap();
    stopper.await.unwrap();

    assert_eq!(broker.published_to("orders").len(), 1);
    assert_eq!(engine.remaining_tasks(), 0);
}

#[tokio::test]
async fn test_task_retries_override_parameter_default() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    engine.push_task(
        TaskBuilder::new("t1")
            .routable()
            .variable("retries", json!(3))
            .retries(2)
            .build(),
    );
    assert_ok!(bridge.poll_once().await);

    assert_eq!(broker.published_to("orders")[0].json()["headers"]["camundaRetries"], json!(2));
}

#[tokio::test]
async fn test_message_variable_is_extended_not_replaced() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    engine.push_task(
        TaskBuilder::new("t2")
            .routable()
            .variable("errorCode", json!("E1"))
            .variable("errorRetries", json!(3))
            .variable("sku", json!("A-1"))
            .message(json!({
                "headers": {"camundaErrorCounter": 1, "trace": "abc"},
                "data": {"order": {"id": 7}}
            }))
            .build(),
    );
    assert_ok!(bridge.poll_once().await);

    let envelope = broker.published_to("orders")[0].json();
    assert_eq!(envelope["headers"]["trace"], json!("abc"));
    assert_eq!(envelope["headers"]["camundaErrorCode"], json!("E1"));
    // counter from the previous pass survives
    assert_eq!(envelope["headers"]["camundaErrorCounter"], json!(1));
    assert_eq!(envelope["headers"]["camundaExternalTaskId"], json!("t2"));
    assert_eq!(envelope["data"]["order"], json!({"id": 7}));
    assert_eq!(envelope["data"]["parameters"], json!({"sku": "A-1"}));
}

#[tokio::test]
async fn test_vhost_parameter_selects_session() {
    let engine = InMemoryExternalTaskService::new();
    let broker = InMemoryBroker::default();
    let bridge = inbound_bridge(&engine, &broker, &test_config());

    engine.push_task(
        TaskBuilder::new("t3")
            .routable()
            .variable("vhost", json!("billing"))
            .variable("response_command", json!("shipped"))
            .build(),
    );
    assert_ok!(bridge.poll_once().await);

    let published = broker.published_to("orders");
    assert_eq!(published[0].vhost, "billing");
    assert_eq!(published[0].json()["headers"]["vhost"], json!("billing"));
    assert_eq!(
        published[0].json()["headers"]["response_command"],
        json!("shipped")
    );
    assert_eq!(bridge.publisher().open_sessions().await, 1);
}
