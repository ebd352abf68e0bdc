//! Workflow detail proxy

use super::json_body;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::execution::DashboardResponse;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde_json::Value;

/// Fetch dashboard data for one run from the execution API.
///
/// `run_number` is forwarded untouched; it only has to be present.
pub async fn get_detail(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let workflow_id = body
        .get("workflow_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty());
    let run_number = body.get("run_number");

    let (Some(workflow_id), Some(run_number)) = (workflow_id, run_number) else {
        return Err(ApiError::BadRequest(
            "Missing required fields (workflow_id, run_number)".to_string(),
        ));
    };

    match state.dispatcher.detail(workflow_id, run_number).await {
        Ok(DashboardResponse::Data(data)) => Ok(Json(data)),
        Ok(DashboardResponse::Failed { status, details }) => {
            tracing::warn!(workflow_id, status, "Dashboard lookup failed");
            Err(ApiError::UpstreamStatus { status, details })
        }
        Err(e) => {
            tracing::error!(workflow_id, error = %e, "Dashboard lookup error");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}
