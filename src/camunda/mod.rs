//! # Camunda Module
//!
//! The external-task REST contract, its HTTP client and an in-memory engine.

pub mod client;
pub mod in_memory;
pub mod service;
pub mod types;

pub use client::CamundaApiClient;
pub use in_memory::{EngineCall, InMemoryExternalTaskService, ScriptedAnswer};
pub use service::ExternalTaskService;
pub use types::{
    BpmnErrorRequest, ClaimedTask, CompleteRequest, EngineResponse, FailureRequest,
    FetchAndLockRequest, VariableValue, Variables,
};
