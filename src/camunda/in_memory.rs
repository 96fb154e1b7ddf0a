//! # In-Memory Engine
//!
//! Scriptable [`ExternalTaskService`] that records every call. Used by the
//! bridge tests and for running a bridge without a process engine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::service::ExternalTaskService;
use super::types::{
    BpmnErrorRequest, ClaimedTask, CompleteRequest, EngineResponse, FailureRequest,
    FetchAndLockRequest, Variables,
};
use crate::error::{BridgeError, BridgeResult};
use crate::messaging::providers::EventJournal;

/// A call received by the in-memory engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    FetchAndLock(FetchAndLockRequest),
    Complete {
        task_id: String,
        request: CompleteRequest,
    },
    HandleError {
        task_id: String,
        request: BpmnErrorRequest,
    },
    HandleFailure {
        task_id: String,
        request: FailureRequest,
    },
    GetVariables {
        process_instance_id: String,
    },
}

/// How the engine answers resolution calls
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedAnswer {
    Accept,
    Reject(EngineResponse),
    Unreachable,
}

#[derive(Debug)]
struct EngineState {
    tasks: VecDeque<ClaimedTask>,
    snapshots: HashMap<String, Variables>,
    completion: ScriptedAnswer,
    resolution: ScriptedAnswer,
    failing_fetches: usize,
    completed: HashSet<String>,
    calls: Vec<EngineCall>,
}

#[derive(Debug, Clone)]
pub struct InMemoryExternalTaskService {
    state: Arc<Mutex<EngineState>>,
    journal: Option<EventJournal>,
}

impl Default for InMemoryExternalTaskService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExternalTaskService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                tasks: VecDeque::new(),
                snapshots: HashMap::new(),
                completion: ScriptedAnswer::Accept,
                resolution: ScriptedAnswer::Accept,
                failing_fetches: 0,
                completed: HashSet::new(),
                calls: Vec::new(),
            })),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Make a task available to fetchAndLock
    pub fn push_task(&self, task: ClaimedTask) {
        self.state.lock().tasks.push_back(task);
    }

    /// Variables returned for a process instance; unknown instances answer 404
    pub fn set_variables(&self, process_instance_id: impl Into<String>, variables: Variables) {
        self.state
            .lock()
            .snapshots
            .insert(process_instance_id.into(), variables);
    }

    pub fn answer_completions_with(&self, answer: ScriptedAnswer) {
        self.state.lock().completion = answer;
    }

    /// Answer for handleError and handleFailure
    pub fn answer_resolutions_with(&self, answer: ScriptedAnswer) {
        self.state.lock().resolution = answer;
    }

    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().failing_fetches = count;
    }

    pub fn remaining_tasks(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn completions(&self) -> Vec<(String, CompleteRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Complete { task_id, request } => Some((task_id, request)),
                _ => None,
            })
            .collect()
    }

    pub fn bpmn_errors(&self) -> Vec<(String, BpmnErrorRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::HandleError { task_id, request } => Some((task_id, request)),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(String, FailureRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::HandleFailure { task_id, request } => Some((task_id, request)),
                _ => None,
            })
            .collect()
    }

    /// Resolution calls only (complete, handleError, handleFailure)
    pub fn resolution_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    EngineCall::Complete { .. }
                        | EngineCall::HandleError { .. }
                        | EngineCall::HandleFailure { .. }
                )
            })
            .count()
    }

    fn record(&self, call: EngineCall, entry: String) {
        self.state.lock().calls.push(call);
        if let Some(journal) = &self.journal {
            journal.record(entry);
        }
    }

    fn answer(answer: &ScriptedAnswer, operation: &str) -> BridgeResult<EngineResponse> {
        match answer {
            ScriptedAnswer::Accept => Ok(EngineResponse::accepted(204)),
            ScriptedAnswer::Reject(response) => Ok(response.clone()),
            ScriptedAnswer::Unreachable => {
                Err(BridgeError::engine(operation, "in-memory engine unreachable"))
            }
        }
    }
}

#[async_trait]
impl ExternalTaskService for InMemoryExternalTaskService {
    async fn fetch_and_lock(&self, request: &FetchAndLockRequest) -> BridgeResult<Vec<ClaimedTask>> {
        self.record(
            EngineCall::FetchAndLock(request.clone()),
            "fetch_and_lock".to_string(),
        );

        let mut state = self.state.lock();
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(BridgeError::engine("fetchAndLock", "HTTP 503: unavailable"));
        }

        let topics: HashSet<&str> = request
            .topics
            .iter()
            .map(|topic| topic.topic_name.as_str())
            .collect();
        let mut claimed = Vec::new();
        while claimed.len() < request.max_tasks as usize {
            let position = state
                .tasks
                .iter()
                .position(|task| topics.contains(task.topic_name.as_str()));
            match position.and_then(|index| state.tasks.remove(index)) {
                Some(mut task) => {
                    task.worker_id = Some(request.worker_id.clone());
                    claimed.push(task);
                }
                None => break,
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> BridgeResult<EngineResponse> {
        self.record(
            EngineCall::Complete {
                task_id: task_id.to_string(),
                request: request.clone(),
            },
            format!("complete:{task_id}"),
        );

        let mut state = self.state.lock();
        if state.completed.contains(task_id) {
            return Ok(EngineResponse::rejected(
                404,
                "RestException",
                format!("External task with id {task_id} does not exist"),
            ));
        }
        let response = Self::answer(&state.completion, "complete")?;
        if response.is_success() {
            state.completed.insert(task_id.to_string());
        }
        Ok(response)
    }

    async fn handle_error(
        &self,
        task_id: &str,
        request: &BpmnErrorRequest,
    ) -> BridgeResult<EngineResponse> {
        self.record(
            EngineCall::HandleError {
                task_id: task_id.to_string(),
                request: request.clone(),
            },
            format!("handle_error:{task_id}"),
        );
        Self::answer(&self.state.lock().resolution, "bpmnError")
    }

    async fn handle_failure(
        &self,
        task_id: &str,
        request: &FailureRequest,
    ) -> BridgeResult<EngineResponse> {
        self.record(
            EngineCall::HandleFailure {
                task_id: task_id.to_string(),
                request: request.clone(),
            },
            format!("handle_failure:{task_id}"),
        );
        Self::answer(&self.state.lock().resolution, "failure")
    }

    async fn get_variables(&self, process_instance_id: &str) -> BridgeResult<Variables> {
        self.record(
            EngineCall::GetVariables {
                process_instance_id: process_instance_id.to_string(),
            },
            format!("get_variables:{process_instance_id}"),
        );
        self.state
            .lock()
            .snapshots
            .get(process_instance_id)
            .cloned()
            .ok_or_else(|| {
                BridgeError::engine(
                    "getVariables",
                    format!("HTTP 404: Process instance with id {process_instance_id} does not exist"),
                )
            })
    }
}
