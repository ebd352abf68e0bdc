//! External execution API
//!
//! The orchestrators only see the [`ExecutionApi`] trait; the reqwest-backed
//! [`IntegratorClient`] is the production implementation.

mod client;
mod request;

pub use client::IntegratorClient;
pub use request::{FeatureFlags, RetryRequest, RunDefaults, RunRequest, TriggerParams, TriggerRequest};

use async_trait::async_trait;
use conductor_types::WorkflowId;
use serde_json::Value;
use thiserror::Error;

/// Fallback failure text when the API gives no reason
pub const NO_WORKFLOW_ID: &str = "No workflow_id returned";

/// Errors raised by the execution API client
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection failure or timeout
    #[error("{0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("Execution API responded {status}: {details}")]
    Rejected {
        status: u16,
        details: String,
        body: Option<Value>,
    },

    /// Success status but no workflow id in the body
    #[error("{}", failure_details(.body))]
    MissingWorkflowId { status: u16, body: Value },

    /// Success status with an unreadable body
    #[error("Invalid response from execution API: {message}")]
    Decode { status: u16, message: String },
}

/// What the caller is told when the primary call fails
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFailure {
    pub details: String,
    pub api_response: Option<Value>,
    pub http_status: Option<u16>,
}

impl From<UpstreamError> for UpstreamFailure {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Transport(message) => Self {
                details: message,
                api_response: None,
                http_status: None,
            },
            UpstreamError::Rejected {
                status,
                details,
                body,
            } => Self {
                details,
                api_response: body,
                http_status: Some(status),
            },
            UpstreamError::MissingWorkflowId { status, body } => Self {
                details: failure_details(&body),
                api_response: Some(body),
                http_status: Some(status),
            },
            UpstreamError::Decode { status, message } => Self {
                details: message,
                api_response: None,
                http_status: Some(status),
            },
        }
    }
}

/// Reason text from an API body: `message`, else `error`, else [`NO_WORKFLOW_ID`]
pub fn failure_details(body: &Value) -> String {
    ["message", "error"]
        .iter()
        .find_map(|field| match body.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | Some(Value::Bool(false)) | Some(Value::String(_)) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_else(|| NO_WORKFLOW_ID.to_string())
}

/// Successful response to a run request
#[derive(Debug, Clone, PartialEq)]
pub struct RunAccepted {
    pub workflow_id: WorkflowId,
    /// Run number chosen by the API, if it reported one
    pub run_number: Option<i64>,
    pub http_status: u16,
    pub body: Value,
}

/// Outcome of a dashboard-data lookup
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardResponse {
    Data(Value),
    /// Upstream answered with a non-success status; passed through to the caller
    Failed { status: u16, details: String },
}

#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// `POST /workflows/create-app/run`
    async fn run_workflow(&self, request: &RunRequest) -> Result<RunAccepted, UpstreamError>;

    /// `POST /dashboard/get-data`
    async fn dashboard_data(
        &self,
        workflow_id: &str,
        run_number: &Value,
    ) -> Result<DashboardResponse, UpstreamError>;
}
