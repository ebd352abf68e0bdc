//! Workflow trigger, retry and lifecycle handlers

use super::{json_body, present};
use crate::api::rest::state::AppState;
use crate::dispatcher::Submission;
use crate::error::{ApiError, ApiResult};
use crate::execution::{RetryRequest, TriggerParams, TriggerRequest};
use crate::orchestrator::{RetryOutcome, TriggerOutcome};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use conductor_types::{Environment, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Trigger request body
#[derive(Debug, Default, Deserialize)]
pub struct TriggerBody {
    pub app_name: Option<String>,
    pub connection_id: Option<String>,
    pub environment: Option<String>,
    pub finder_instructions: Option<String>,
    pub test_all_actions: Option<bool>,
}

/// Successful trigger or retry
#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub success: bool,
    pub workflow_id: WorkflowId,
    pub run_number: i64,
    pub app_name: String,
}

/// Trigger a workflow, queueing it when at capacity
pub async fn trigger_workflow(
    State(state): State<AppState>,
    payload: Result<Json<TriggerBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let app_name = present(body.app_name)
        .ok_or_else(|| ApiError::BadRequest("Missing required field: app_name".to_string()))?;

    let request = TriggerRequest::new(app_name.clone())
        .with_connection(body.connection_id)
        .with_environment(Environment::normalize(body.environment.as_deref()))
        .with_params(TriggerParams {
            finder_instructions: body.finder_instructions,
            test_all_actions: body.test_all_actions.unwrap_or(false),
        });

    match state.dispatcher.submit(request).await? {
        Submission::Triggered(TriggerOutcome::Succeeded {
            workflow_id,
            run_number,
            app_name,
        }) => Ok(Json(json!(StartedResponse {
            success: true,
            workflow_id,
            run_number,
            app_name,
        }))),
        Submission::Triggered(TriggerOutcome::Failed(failure)) => Err(ApiError::Upstream {
            context: "Failed to trigger workflow",
            failure,
        }),
        Submission::Queued {
            position,
            active,
            limit,
        } => Ok(Json(json!({
            "queued": true,
            "position": position,
            "message": format!(
                "Workflow queued at position {} ({}/{} running)",
                position, active, limit
            ),
        }))),
        Submission::Rejected { workflow_id } => Err(ApiError::AlreadyRunning {
            app_name,
            workflow_id,
        }),
    }
}

/// Retry request body
#[derive(Debug, Default, Deserialize)]
pub struct RetryBody {
    pub app_name: Option<String>,
    pub workflow_id: Option<String>,
    pub connection_id: Option<String>,
    pub environment: Option<String>,
}

/// Re-run an existing workflow, bypassing admission
pub async fn retry_workflow(
    State(state): State<AppState>,
    payload: Result<Json<RetryBody>, JsonRejection>,
) -> ApiResult<Json<StartedResponse>> {
    let body = json_body(payload)?;
    let (Some(app_name), Some(workflow_id)) = (present(body.app_name), present(body.workflow_id))
    else {
        return Err(ApiError::BadRequest(
            "Missing required fields (app_name, workflow_id)".to_string(),
        ));
    };

    let request = RetryRequest::new(app_name, WorkflowId::new(workflow_id))
        .with_connection(body.connection_id)
        .with_environment(Environment::normalize(body.environment.as_deref()));

    match state.dispatcher.retry(request).await? {
        RetryOutcome::Succeeded {
            workflow_id,
            run_number,
            app_name,
            ..
        } => Ok(Json(StartedResponse {
            success: true,
            workflow_id,
            run_number,
            app_name,
        })),
        RetryOutcome::Failed(failure) => Err(ApiError::Upstream {
            context: "Failed to trigger rerun",
            failure,
        }),
    }
}

/// Run completion body
#[derive(Debug, Default, Deserialize)]
pub struct CompleteRunBody {
    pub workflow_id: Option<String>,
    pub run_number: Option<i64>,
    pub execution_state: Option<String>,
    pub failure_summary: Option<String>,
}

/// Mark a run finished and let queued work move up
pub async fn complete_run(
    State(state): State<AppState>,
    payload: Result<Json<CompleteRunBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let (Some(workflow_id), Some(run_number)) = (present(body.workflow_id), body.run_number) else {
        return Err(ApiError::BadRequest(
            "Missing required fields (workflow_id, run_number)".to_string(),
        ));
    };

    let run = state
        .dispatcher
        .complete_run(
            &WorkflowId::new(workflow_id),
            run_number,
            present(body.execution_state).as_deref(),
            body.failure_summary.as_deref(),
        )
        .await?;

    Ok(Json(json!({ "success": true, "run": run })))
}

/// Queue cancellation body
#[derive(Debug, Default, Deserialize)]
pub struct CancelQueuedBody {
    pub position: Option<i64>,
}

pub async fn cancel_queued(
    State(state): State<AppState>,
    payload: Result<Json<CancelQueuedBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let position = json_body(payload)?
        .position
        .ok_or_else(|| ApiError::BadRequest("Missing required field: position".to_string()))?;

    state.dispatcher.cancel_queued(position).await?;
    Ok(Json(json!({ "success": true })))
}
