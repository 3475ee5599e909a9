//! HTTP client for the executor service (service-to-service).
//!
//! Requests carry the shared internal key; payloads carry the cluster's
//! ciphertext, never a plaintext credential.

use std::time::Duration;

use gatehouse_protocol::defaults::{EXECUTOR_CALL_TIMEOUT_SECS, INTERNAL_KEY_HEADER};
use gatehouse_protocol::{CreateJobRequest, JobView};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executor unreachable: {0}")]
    Transport(String),

    #[error("Executor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Clone)]
pub struct ExecutorClient {
    base_url: String,
    internal_api_key: String,
    http: reqwest::Client,
}

impl ExecutorClient {
    pub fn new(base_url: impl Into<String>, internal_api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            internal_api_key: internal_api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    /// POST /jobs - submit a job and wait for its result.
    pub async fn create_job(&self, request: &CreateJobRequest) -> Result<JobView, ExecutorError> {
        let response = self
            .http
            .post(format!("{}/jobs", self.base_url))
            .header(INTERNAL_KEY_HEADER, &self.internal_api_key)
            .timeout(Duration::from_secs(EXECUTOR_CALL_TIMEOUT_SECS))
            .json(request)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Self::parse(response).await
    }

    /// GET /jobs/{id}
    pub async fn get_job(&self, job_id: i64) -> Result<JobView, ExecutorError> {
        let response = self
            .http
            .get(format!("{}/jobs/{}", self.base_url, job_id))
            .header(INTERNAL_KEY_HEADER, &self.internal_api_key)
            .timeout(Duration::from_secs(EXECUTOR_CALL_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Self::parse(response).await
    }

    /// GET /jobs?proposal_id=
    pub async fn list_jobs_for_proposal(
        &self,
        proposal_id: i64,
    ) -> Result<Vec<JobView>, ExecutorError> {
        let response = self
            .http
            .get(format!("{}/jobs", self.base_url))
            .query(&[("proposal_id", proposal_id)])
            .header(INTERNAL_KEY_HEADER, &self.internal_api_key)
            .timeout(Duration::from_secs(EXECUTOR_CALL_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExecutorError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))
    }
}
