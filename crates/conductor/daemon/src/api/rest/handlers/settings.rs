//! Runtime settings handler

use super::{json_body, present};
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult, DispatchError};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub struct UpdateConfigBody {
    pub key: Option<String>,
    pub value: Option<Value>,
}

pub async fn update_config(
    State(state): State<AppState>,
    payload: Result<Json<UpdateConfigBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let (Some(key), Some(value)) = (present(body.key), body.value) else {
        return Err(ApiError::BadRequest(
            "Missing required fields (key, value)".to_string(),
        ));
    };

    state
        .dispatcher
        .update_config(&key, &value)
        .await
        .map_err(|err| match err {
            DispatchError::Storage(err) => ApiError::ConfigUpdate(err),
            other => other.into(),
        })?;

    Ok(Json(json!({ "success": true })))
}
