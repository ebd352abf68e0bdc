//! Error types for conductor-daemon

use crate::execution::{UpstreamError, UpstreamFailure};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conductor_types::{UnknownConfigKey, WorkflowId};
use serde_json::json;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Execution API client error
    #[error("Execution API error: {0}")]
    Upstream(#[from] UpstreamError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection error, including timeouts
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Non-success response from a REST store
    #[error("Store responded {status}: {body}")]
    Http { status: u16, body: String },
}

/// Errors raised by the admission, sequencing and orchestration components
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    UnknownConfigKey(#[from] UnknownConfigKey),

    #[error("Run {run_number} of workflow {workflow_id} not found")]
    RunNotFound {
        workflow_id: WorkflowId,
        run_number: i64,
    },

    #[error("No queued workflow at position {0}")]
    QueueEntryNotFound(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// The app already has an active run
    #[error("A workflow is already running for {app_name}")]
    AlreadyRunning {
        app_name: String,
        workflow_id: WorkflowId,
    },

    /// The execution API refused or failed the primary call
    #[error("{context}: {}", .failure.details)]
    Upstream {
        context: &'static str,
        failure: UpstreamFailure,
    },

    /// Non-success status from a proxied lookup, passed through as-is
    #[error("Failed to fetch workflow data: {details}")]
    UpstreamStatus { status: u16, details: String },

    /// Config row could not be written
    #[error("Failed to update config: {0}")]
    ConfigUpdate(StorageError),

    /// Storage error
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Internal error
    #[error("{0}")]
    Internal(String),

    /// Verb other than POST or OPTIONS
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(message) => ApiError::BadRequest(message),
            DispatchError::UnknownConfigKey(_) => {
                ApiError::BadRequest("Unknown config key".to_string())
            }
            err @ (DispatchError::RunNotFound { .. } | DispatchError::QueueEntryNotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            DispatchError::Storage(err) => ApiError::Storage(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::AlreadyRunning { workflow_id, .. } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "already_running",
                    "message": self.to_string(),
                    "workflow_id": workflow_id,
                }),
            ),
            ApiError::Upstream { context, failure } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": context,
                    "details": failure.details,
                    "api_response": failure.api_response,
                    "http_status": failure.http_status,
                }),
            ),
            ApiError::UpstreamStatus { status, details } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                json!({ "error": "Failed to fetch workflow data", "details": details }),
            ),
            ApiError::ConfigUpdate(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to update config", "details": err.to_string() }),
            ),
            ApiError::Storage(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message }),
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method not allowed" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for business operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
