//! In-process fakes shared by unit tests

use crate::error::StorageError;
use crate::execution::{DashboardResponse, ExecutionApi, RunAccepted, RunRequest, UpstreamError};
use crate::storage::{Collection, Filter, InMemoryStore, Query, Records, Row, StorageResult, StoreClient};
use async_trait::async_trait;
use conductor_types::WorkflowId;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn memory_records() -> Records {
    Records::new(Arc::new(InMemoryStore::new()))
}

/// Execution API that replays scripted answers in order.
///
/// Once the script runs out every call is accepted with a fresh id.
#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<VecDeque<Result<RunAccepted, UpstreamError>>>,
    calls: Mutex<Vec<RunRequest>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accept(&self, workflow_id: &str, run_number: Option<i64>) {
        let body = json!({ "workflow_id": workflow_id, "run_number": run_number });
        self.push(Ok(RunAccepted {
            workflow_id: WorkflowId::new(workflow_id),
            run_number,
            http_status: 200,
            body,
        }));
    }

    pub fn fail(&self, err: UpstreamError) {
        self.push(Err(err));
    }

    fn push(&self, answer: Result<RunAccepted, UpstreamError>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn calls(&self) -> Vec<RunRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionApi for ScriptedApi {
    async fn run_workflow(&self, request: &RunRequest) -> Result<RunAccepted, UpstreamError> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len()
        };
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            let id = format!("wf-auto-{}", call_index);
            Ok(RunAccepted {
                workflow_id: WorkflowId::new(id.clone()),
                run_number: None,
                http_status: 200,
                body: json!({ "workflow_id": id }),
            })
        })
    }

    async fn dashboard_data(
        &self,
        workflow_id: &str,
        run_number: &Value,
    ) -> Result<DashboardResponse, UpstreamError> {
        Ok(DashboardResponse::Data(
            json!({ "workflow_id": workflow_id, "run_number": run_number }),
        ))
    }
}

/// Store whose every call fails
pub struct FailingStore;

fn unavailable<T>() -> StorageResult<T> {
    Err(StorageError::Connection("store unavailable".to_string()))
}

#[async_trait]
impl StoreClient for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn select(&self, _: Collection, _: &Query) -> StorageResult<Vec<Row>> {
        unavailable()
    }

    async fn insert(&self, _: Collection, _: Row) -> StorageResult<()> {
        unavailable()
    }

    async fn update(&self, _: Collection, _: &[Filter], _: Row) -> StorageResult<u64> {
        unavailable()
    }

    async fn delete(&self, _: Collection, _: &[Filter]) -> StorageResult<u64> {
        unavailable()
    }

    async fn next_sequence(&self, _: Collection, _: &str) -> StorageResult<i64> {
        unavailable()
    }
}
