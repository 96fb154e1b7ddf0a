//! # Camunda REST Client
//!
//! HTTP implementation of [`ExternalTaskService`] against the engine's
//! `external-task` and `process-instance` resources, with optional basic auth.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::service::ExternalTaskService;
use super::types::{
    BpmnErrorRequest, ClaimedTask, CompleteRequest, EngineErrorBody, EngineResponse,
    FailureRequest, FetchAndLockRequest, Variables,
};
use crate::config::CamundaConfig;
use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone)]
pub struct CamundaApiClient {
    client: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl CamundaApiClient {
    pub fn new(config: &CamundaConfig) -> BridgeResult<Self> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| BridgeError::configuration(format!("Invalid Camunda API URL: {e}")))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("bpm-connector/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = match (&config.api_login, &config.api_pass) {
            (Some(login), Some(pass)) => Some((login.clone(), pass.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Base URL plus one escaped path segment per element
    fn endpoint(&self, segments: &[&str]) -> BridgeResult<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(BridgeError::engine(
                "endpoint",
                format!("invalid resource id {bad:?}"),
            ));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BridgeError::configuration("Camunda API URL cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((login, pass)) => request.basic_auth(login, Some(pass)),
            None => request,
        }
    }

    async fn post_resolution<B: serde::Serialize + Sync>(
        &self,
        operation: &str,
        segments: &[&str],
        body: &B,
    ) -> BridgeResult<EngineResponse> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, operation, "Calling Camunda");

        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;
        Ok(Self::engine_response(response).await)
    }

    async fn engine_response(response: Response) -> EngineResponse {
        let status = response.status();
        if status.is_success() {
            return EngineResponse::accepted(status.as_u16());
        }
        let error = response.json::<EngineErrorBody>().await.ok();
        EngineResponse {
            status: status.as_u16(),
            error,
        }
    }

    async fn handle_response<T>(response: Response, operation: &str) -> BridgeResult<T>
    where
        T: DeserializeOwned,
    {
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| {
                BridgeError::engine(operation, format!("Failed to parse response: {e}"))
            })
        } else {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Failed operation: {}", operation);
            Err(BridgeError::engine(
                operation,
                format!("HTTP {status}: {error_text}"),
            ))
        }
    }
}

#[async_trait]
impl ExternalTaskService for CamundaApiClient {
    async fn fetch_and_lock(&self, request: &FetchAndLockRequest) -> BridgeResult<Vec<ClaimedTask>> {
        let url = self.endpoint(&["external-task", "fetchAndLock"])?;
        let response = self
            .authorize(self.client.post(url))
            .json(request)
            .send()
            .await?;
        Self::handle_response(response, "fetchAndLock").await
    }

    async fn complete(&self, task_id: &str, request: &CompleteRequest) -> BridgeResult<EngineResponse> {
        self.post_resolution("complete", &["external-task", task_id, "complete"], request)
            .await
    }

    async fn handle_error(
        &self,
        task_id: &str,
        request: &BpmnErrorRequest,
    ) -> BridgeResult<EngineResponse> {
        self.post_resolution("bpmnError", &["external-task", task_id, "bpmnError"], request)
            .await
    }

    async fn handle_failure(
        &self,
        task_id: &str,
        request: &FailureRequest,
    ) -> BridgeResult<EngineResponse> {
        self.post_resolution("failure", &["external-task", task_id, "failure"], request)
            .await
    }

    async fn get_variables(&self, process_instance_id: &str) -> BridgeResult<Variables> {
        let mut url = self.endpoint(&["process-instance", process_instance_id, "variables"])?;
        url.query_pairs_mut().append_pair("deserializeValues", "false");

        let response = self.authorize(self.client.get(url)).send().await?;
        Self::handle_response(response, "getVariables").await
    }
}
