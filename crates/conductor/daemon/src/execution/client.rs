//! reqwest client for the integrator execution API

use super::{
    failure_details, DashboardResponse, ExecutionApi, RunAccepted, RunRequest, UpstreamError,
};
use async_trait::async_trait;
use conductor_types::WorkflowId;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP client for the execution API
#[derive(Debug, Clone)]
pub struct IntegratorClient {
    client: Client,
    base_url: String,
}

impl IntegratorClient {
    /// Create a client; every call is bounded by `timeout_secs`
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(
        &self,
        path: &str,
        body: &(impl serde::Serialize + Sync),
    ) -> Result<(u16, String), UpstreamError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok((status, text))
    }
}

fn workflow_id_of(body: &Value) -> Option<WorkflowId> {
    match body.get("workflow_id")? {
        Value::String(id) if !id.is_empty() => Some(WorkflowId::new(id.clone())),
        Value::Number(n) => Some(WorkflowId::new(n.to_string())),
        _ => None,
    }
}

#[async_trait]
impl ExecutionApi for IntegratorClient {
    async fn run_workflow(&self, request: &RunRequest) -> Result<RunAccepted, UpstreamError> {
        let (status, text) = self.post("/workflows/create-app/run", request).await?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        tracing::debug!(
            app_name = %request.app_name,
            status,
            "Execution API responded"
        );

        if !(200..300).contains(&status) {
            let details = match &body {
                Some(body) => failure_details(body),
                None if !text.trim().is_empty() => text.trim().to_string(),
                None => super::NO_WORKFLOW_ID.to_string(),
            };
            return Err(UpstreamError::Rejected {
                status,
                details,
                body,
            });
        }

        let body = body.ok_or_else(|| UpstreamError::Decode {
            status,
            message: "response body is not JSON".to_string(),
        })?;

        match workflow_id_of(&body) {
            // `fail_` ids are reserved for local failure sentinels
            Some(workflow_id) if workflow_id.is_failure_sentinel() => {
                tracing::warn!(
                    workflow_id = %workflow_id,
                    "Execution API returned an id in the reserved failure namespace"
                );
                Err(UpstreamError::Decode {
                    status,
                    message: format!("workflow_id {} uses the reserved failure prefix", workflow_id),
                })
            }
            Some(workflow_id) => Ok(RunAccepted {
                workflow_id,
                run_number: body.get("run_number").and_then(Value::as_i64),
                http_status: status,
                body,
            }),
            None => Err(UpstreamError::MissingWorkflowId { status, body }),
        }
    }

    async fn dashboard_data(
        &self,
        workflow_id: &str,
        run_number: &Value,
    ) -> Result<DashboardResponse, UpstreamError> {
        let payload = json!({ "workflow_id": workflow_id, "run_number": run_number });
        let (status, text) = self.post("/dashboard/get-data", &payload).await?;

        if !(200..300).contains(&status) {
            return Ok(DashboardResponse::Failed {
                status,
                details: text,
            });
        }

        serde_json::from_str(&text)
            .map(DashboardResponse::Data)
            .map_err(|e| UpstreamError::Decode {
                status,
                message: e.to_string(),
            })
    }
}
