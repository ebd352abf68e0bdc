//! Trigger and retry orchestration
//!
//! Calls the execution API and reconciles the answer into workflow and run
//! records. Bookkeeping writes after the API call are best-effort: a failed
//! write is logged and never changes the outcome reported to the caller.

use crate::error::{DispatchError, DispatchResult};
use crate::execution::{
    ExecutionApi, RetryRequest, RunDefaults, RunRequest, TriggerRequest, UpstreamFailure,
};
use crate::sequencer::RunSequencer;
use crate::storage::Records;
use conductor_types::{QueueEntry, Workflow, WorkflowId};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Succeeded {
        workflow_id: WorkflowId,
        run_number: i64,
        app_name: String,
    },
    Failed(UpstreamFailure),
}

impl TriggerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TriggerOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Succeeded {
        workflow_id: WorkflowId,
        run_number: i64,
        app_name: String,
        /// The API started a new lineage instead of reusing the prior id
        new_lineage: bool,
    },
    Failed(UpstreamFailure),
}

/// Drives the execution API and records what happened
pub struct TriggerOrchestrator {
    records: Records,
    sequencer: RunSequencer,
    api: Arc<dyn ExecutionApi>,
    defaults: RunDefaults,
}

impl TriggerOrchestrator {
    pub fn new(records: Records, api: Arc<dyn ExecutionApi>, defaults: RunDefaults) -> Self {
        Self {
            sequencer: RunSequencer::new(records.clone()),
            records,
            api,
            defaults,
        }
    }

    pub fn sequencer(&self) -> &RunSequencer {
        &self.sequencer
    }

    /// Canonical execution request for a fresh trigger
    pub fn payload_for(&self, request: &TriggerRequest) -> RunRequest {
        request.to_run_request(&self.defaults)
    }

    pub async fn trigger(&self, request: &TriggerRequest) -> DispatchResult<TriggerOutcome> {
        Ok(self.run(&self.payload_for(request)).await)
    }

    /// Re-issue a payload that was parked in the queue
    pub async fn dispatch_queued(&self, entry: &QueueEntry) -> DispatchResult<TriggerOutcome> {
        let payload: RunRequest = serde_json::from_value(entry.payload.clone()).map_err(|e| {
            DispatchError::Validation(format!(
                "Undecodable queued payload at position {}: {}",
                entry.position, e
            ))
        })?;
        Ok(self.run(&payload).await)
    }

    /// Send `payload` to the execution API and record the result
    pub async fn run(&self, payload: &RunRequest) -> TriggerOutcome {
        tracing::info!(app_name = %payload.app_name, env = %payload.env, "Triggering workflow");

        let accepted = match self.api.run_workflow(payload).await {
            Ok(accepted) => accepted,
            Err(err) => {
                let failure = UpstreamFailure::from(err);
                self.record_failure(payload, &failure).await;
                return TriggerOutcome::Failed(failure);
            }
        };

        let workflow_id = accepted.workflow_id;
        let workflow = Workflow::new(
            workflow_id.clone(),
            payload.app_name.clone(),
            payload.connection_id.clone(),
            payload.env,
        );
        if let Err(e) = self.records.insert_workflow(&workflow).await {
            tracing::error!(workflow_id = %workflow_id, error = %e, "Failed to record workflow");
        }

        let run_number = self
            .sequencer
            .next_run_number(&workflow_id, accepted.run_number)
            .await;
        if let Err(e) = self.sequencer.start_run(&workflow_id, run_number).await {
            tracing::error!(workflow_id = %workflow_id, run_number, error = %e, "Failed to record run");
        }

        tracing::info!(
            app_name = %payload.app_name,
            workflow_id = %workflow_id,
            run_number,
            "Workflow triggered"
        );

        TriggerOutcome::Succeeded {
            workflow_id,
            run_number,
            app_name: payload.app_name.clone(),
        }
    }

    async fn record_failure(&self, payload: &RunRequest, failure: &UpstreamFailure) {
        let sentinel = WorkflowId::failure_sentinel();
        tracing::warn!(
            app_name = %payload.app_name,
            workflow_id = %sentinel,
            http_status = ?failure.http_status,
            details = %failure.details,
            "Workflow trigger failed"
        );

        let workflow = Workflow::new(
            sentinel.clone(),
            payload.app_name.clone(),
            payload.connection_id.clone(),
            payload.env,
        );
        if let Err(e) = self.records.insert_workflow(&workflow).await {
            tracing::error!(workflow_id = %sentinel, error = %e, "Failed to store trigger failure");
            return;
        }
        if let Err(e) = self
            .sequencer
            .record_trigger_failure(&sentinel, &failure.details)
            .await
        {
            tracing::error!(workflow_id = %sentinel, error = %e, "Failed to store trigger failure");
        }
    }

    /// Re-run an existing lineage. Bypasses admission; nothing is recorded on failure.
    pub async fn retry(&self, request: &RetryRequest) -> DispatchResult<RetryOutcome> {
        let payload = request.to_run_request(&self.defaults);
        tracing::info!(
            app_name = %request.app_name,
            previous_workflow_id = %request.prior_workflow_id,
            "Retrying workflow"
        );

        let accepted = match self.api.run_workflow(&payload).await {
            Ok(accepted) => accepted,
            Err(err) => {
                let failure = UpstreamFailure::from(err);
                tracing::warn!(
                    app_name = %request.app_name,
                    http_status = ?failure.http_status,
                    details = %failure.details,
                    "Workflow rerun failed"
                );
                return Ok(RetryOutcome::Failed(failure));
            }
        };

        let workflow_id = accepted.workflow_id;
        let new_lineage = workflow_id != request.prior_workflow_id;
        if new_lineage {
            let workflow = Workflow::new(
                workflow_id.clone(),
                request.app_name.clone(),
                request.connection_id.clone(),
                request.environment,
            );
            if let Err(e) = self.records.insert_workflow(&workflow).await {
                tracing::error!(workflow_id = %workflow_id, error = %e, "Failed to record workflow");
            }
        }

        let run_number = self
            .sequencer
            .next_run_number(&workflow_id, accepted.run_number)
            .await;
        if let Err(e) = self.sequencer.start_run(&workflow_id, run_number).await {
            tracing::error!(workflow_id = %workflow_id, run_number, error = %e, "Failed to record run");
        }

        Ok(RetryOutcome::Succeeded {
            workflow_id,
            run_number,
            app_name: request.app_name.clone(),
            new_lineage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::UpstreamError;
    use crate::test_support::{memory_records, FailingStore, ScriptedApi};
    use conductor_types::{execution_state, Environment, RunStatus};
    use serde_json::json;

    fn orchestrator(records: &Records, api: &Arc<ScriptedApi>) -> TriggerOrchestrator {
        TriggerOrchestrator::new(records.clone(), api.clone(), RunDefaults::default())
    }

    #[tokio::test]
    async fn test_trigger_success_records_pending_run() {
        let records = memory_records();
        let api = ScriptedApi::new();
        api.accept("wf-1", None);

        let outcome = orchestrator(&records, &api)
            .trigger(&TriggerRequest::new("github").with_environment(Environment::Staging))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TriggerOutcome::Succeeded {
                workflow_id: WorkflowId::new("wf-1"),
                run_number: 1,
                app_name: "github".to_string(),
            }
        );

        let workflow = records.workflow(&WorkflowId::new("wf-1")).await.unwrap().unwrap();
        assert_eq!(workflow.environment, Environment::Staging);
        let run = records.find_run(&WorkflowId::new("wf-1"), 1).await.unwrap().unwrap();
        assert_eq!(run.execution_state, execution_state::PENDING);
        assert!(run.is_active());
    }

    #[tokio::test]
    async fn test_trigger_failure_records_sentinel() {
        let records = memory_records();
        let api = ScriptedApi::new();
        api.fail(UpstreamError::Transport("operation timed out".into()));

        let outcome = orchestrator(&records, &api)
            .trigger(&TriggerRequest::new("github"))
            .await
            .unwrap();
        let TriggerOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.details, "operation timed out");

        let ids = records.workflow_ids_for_app("github").await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].is_failure_sentinel());

        let run = records.find_run(&ids[0], 1).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.execution_state, execution_state::TRIGGER_FAILED);
        assert_eq!(run.failure_summary.as_deref(), Some("operation timed out"));
        assert_eq!(records.count_active_runs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bookkeeping_failure_keeps_success() {
        let records = Records::new(Arc::new(FailingStore));
        let api = ScriptedApi::new();
        api.accept("wf-1", Some(4));

        let outcome = orchestrator(&records, &api)
            .trigger(&TriggerRequest::new("github"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TriggerOutcome::Succeeded { run_number: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_retry_same_lineage_increments() {
        let records = memory_records();
        let api = ScriptedApi::new();
        api.accept("wf-1", None);
        api.accept("wf-1", None);
        let orchestrator = orchestrator(&records, &api);

        orchestrator.trigger(&TriggerRequest::new("github")).await.unwrap();
        let outcome = orchestrator
            .retry(&RetryRequest::new("github", WorkflowId::new("wf-1")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                workflow_id: WorkflowId::new("wf-1"),
                run_number: 2,
                app_name: "github".to_string(),
                new_lineage: false,
            }
        );
        assert_eq!(records.workflow_ids_for_app("github").await.unwrap().len(), 1);
        assert_eq!(
            api.calls()[1].previous_workflow_id,
            Some(WorkflowId::new("wf-1"))
        );
    }

    #[tokio::test]
    async fn test_retry_new_lineage_starts_at_one() {
        let records = memory_records();
        let api = ScriptedApi::new();
        api.accept("wf-1", None);
        api.accept("wf-2", None);
        let orchestrator = orchestrator(&records, &api);

        orchestrator.trigger(&TriggerRequest::new("github")).await.unwrap();
        let outcome = orchestrator
            .retry(&RetryRequest::new("github", WorkflowId::new("wf-1")))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            RetryOutcome::Succeeded { run_number: 1, new_lineage: true, .. }
        ));
        assert_eq!(records.workflow_ids_for_app("github").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_failure_records_nothing() {
        let records = memory_records();
        let api = ScriptedApi::new();
        api.fail(UpstreamError::Rejected {
            status: 500,
            details: "boom".into(),
            body: Some(json!({"error": "boom"})),
        });

        let outcome = orchestrator(&records, &api)
            .retry(&RetryRequest::new("github", WorkflowId::new("wf-1")))
            .await
            .unwrap();
        assert!(matches!(outcome, RetryOutcome::Failed(ref f) if f.details == "boom"));
        assert!(records.workflow_ids_for_app("github").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_queued_rejects_garbage() {
        let records = memory_records();
        let api = ScriptedApi::new();
        let entry = QueueEntry::new("github", None, json!({"nope": true}), 1);

        let err = orchestrator(&records, &api)
            .dispatch_queued(&entry)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(api.calls().is_empty());
    }
}
