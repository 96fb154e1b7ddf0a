//! # External Task Service
//!
//! The process-engine operations the bridges depend on.

use async_trait::async_trait;

use super::types::{
    BpmnErrorRequest, ClaimedTask, CompleteRequest, EngineResponse, FailureRequest,
    FetchAndLockRequest, Variables,
};
use crate::error::BridgeResult;

/// Resolution calls return `Ok(EngineResponse)` whenever the engine answered,
/// including refusals; `Err` means the engine could not be reached.
#[async_trait]
pub trait ExternalTaskService: Send + Sync {
    async fn fetch_and_lock(&self, request: &FetchAndLockRequest) -> BridgeResult<Vec<ClaimedTask>>;

    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> BridgeResult<EngineResponse>;

    async fn handle_error(
        &self,
        task_id: &str,
        request: &BpmnErrorRequest,
    ) -> BridgeResult<EngineResponse>;

    async fn handle_failure(
        &self,
        task_id: &str,
        request: &FailureRequest,
    ) -> BridgeResult<EngineResponse>;

    /// Current variables of a process instance, values left serialized
    async fn get_variables(&self, process_instance_id: &str) -> BridgeResult<Variables>;
}
