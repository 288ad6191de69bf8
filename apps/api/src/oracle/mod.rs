//! Workflow-service oracle clients.
//!
//! ARCHITECTURAL RULE: every generative call leaves the process through these
//! traits. The rest of the crate treats both oracles as opaque: they return
//! raw JSON payloads, and all schema validation happens on the caller's side
//! (`scoring::result`), never here.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream body is preserved verbatim in `message`: the scoring
    /// orchestrator classifies credential failures by substring and must see
    /// the original text.
    #[error("Oracle error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Scores a resume against a job's requirement list.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score_resume(
        &self,
        resume_text: &str,
        requirements: &[Value],
    ) -> Result<Value, OracleError>;
}

/// Drafts candidate-facing feedback text from a scoring result.
#[async_trait]
pub trait FeedbackOracle: Send + Sync {
    async fn draft_feedback(
        &self,
        scoring_data: &Value,
        candidate_name: &str,
    ) -> Result<Value, OracleError>;
}

/// HTTP client for the workflow service hosting both oracles.
///
/// No per-request timeout is configured here: the orchestrator owns the
/// attempt bound via its own timeout race.
#[derive(Clone)]
pub struct WorkflowClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WorkflowClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn run_workflow(&self, workflow: &str, input_data: Value) -> Result<Value, OracleError> {
        let response = self
            .client
            .post(format!("{}/workflows/{workflow}/run", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputData": input_data }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload = response.json::<Value>().await?;
        debug!(workflow, "workflow call succeeded");
        Ok(payload)
    }
}

#[async_trait]
impl ScoringOracle for WorkflowClient {
    async fn score_resume(
        &self,
        resume_text: &str,
        requirements: &[Value],
    ) -> Result<Value, OracleError> {
        self.run_workflow(
            "resume-scoring",
            json!({
                "resumeText": resume_text,
                "requirements": requirements,
            }),
        )
        .await
    }
}

#[async_trait]
impl FeedbackOracle for WorkflowClient {
    async fn draft_feedback(
        &self,
        scoring_data: &Value,
        candidate_name: &str,
    ) -> Result<Value, OracleError> {
        self.run_workflow(
            "rejection-feedback",
            json!({
                "scoringData": scoring_data,
                "candidateName": candidate_name,
            }),
        )
        .await
    }
}
