//! Health and status handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Daemon status response
#[derive(Debug, Serialize)]
pub struct DaemonStatusResponse {
    pub active: usize,
    pub max_concurrent: i64,
    pub queued: usize,
    pub storage: &'static str,
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Current load: active runs, effective cap and queue depth
pub async fn daemon_status(State(state): State<AppState>) -> ApiResult<Json<DaemonStatusResponse>> {
    let status = state.dispatcher.status().await?;

    Ok(Json(DaemonStatusResponse {
        active: status.active,
        max_concurrent: status.max_concurrent,
        queued: status.queued,
        storage: status.backend,
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
    }))
}
