#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # BPM Connector
//!
//! Bridges Camunda external tasks and RabbitMQ queues in both directions.
//!
//! ## Overview
//!
//! The **inbound bridge** claims external tasks on one topic, turns each task
//! into an envelope (`{headers, data: {parameters}}`) and publishes it to the
//! queue the task names. A downstream worker does the job and publishes an
//! outcome envelope to the outbound queue. The **outbound bridge** consumes
//! those outcomes and completes the task, raises a BPMN error, or reports a
//! failure with the remaining retry budget. Tasks started by a synchronous
//! caller get exactly one correlated reply.
//!
//! The queue is the only coupling between the two bridges; each runs as its
//! own process and scales by running more processes.
//!
//! ## Module Organization
//!
//! - [`connector`] - Inbound and outbound bridges, parameters, classification, replies
//! - [`camunda`] - External-task REST contract, HTTP client, in-memory engine
//! - [`messaging`] - Envelope format, broker traits, RabbitMQ and in-memory providers
//! - [`config`] - Layered configuration (file + `BPM_CONNECTOR_*` environment)
//! - [`error`] - Bridge errors and the fault taxonomy
//! - [`logging`] - Structured logging setup
//! - [`shutdown`] - Cooperative stop signal for the bridge loops
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bpm_connector::camunda::CamundaApiClient;
//! use bpm_connector::config::BridgeConfig;
//! use bpm_connector::connector::InboundBridge;
//! use bpm_connector::messaging::{providers::RabbitMqConnector, SessionPool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load(None)?;
//! let engine = CamundaApiClient::new(&config.camunda)?;
//! let publisher = SessionPool::new(RabbitMqConnector::new(config.rabbitmq.clone(), "connector-in"));
//! let bridge = InboundBridge::new(engine, publisher, &config)?;
//!
//! let (_trigger, signal) = bpm_connector::shutdown::channel();
//! bridge.run(signal).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                       # Unit and integration tests, in-memory providers
//! cargo test -- --ignored          # Tests against a live RabbitMQ / Camunda
//! ```

pub mod camunda;
pub mod config;
pub mod connector;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod shutdown;

pub use config::BridgeConfig;
pub use connector::{InboundBridge, OutboundBridge, Resolution};
pub use error::{BridgeError, BridgeResult, FaultClass};
pub use messaging::Envelope;
