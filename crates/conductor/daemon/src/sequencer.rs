//! Run numbering and run lifecycle transitions

use crate::error::{DispatchError, DispatchResult};
use crate::storage::Records;
use chrono::Utc;
use conductor_types::{execution_state, Run, RunStatus, WorkflowId};

/// Assigns run numbers per workflow lineage and records run transitions
#[derive(Clone)]
pub struct RunSequencer {
    records: Records,
}

impl RunSequencer {
    pub fn new(records: Records) -> Self {
        Self { records }
    }

    /// Next run number for `workflow_id`.
    ///
    /// A positive API-supplied number wins; otherwise one past the highest
    /// recorded run, or 1 for a fresh lineage. A failed lookup counts as a
    /// fresh lineage.
    pub async fn next_run_number(&self, workflow_id: &WorkflowId, api_supplied: Option<i64>) -> i64 {
        if let Some(n) = api_supplied.filter(|n| *n > 0) {
            return n;
        }

        match self.records.max_run_number(workflow_id).await {
            Ok(Some(max)) => max.max(0) + 1,
            Ok(None) => 1,
            Err(e) => {
                tracing::error!(
                    workflow_id = %workflow_id,
                    error = %e,
                    "Failed to read prior runs, assuming none"
                );
                1
            }
        }
    }

    /// Record a new active run, superseding any still-active run of the same workflow
    pub async fn start_run(&self, workflow_id: &WorkflowId, run_number: i64) -> DispatchResult<Run> {
        let superseded = self
            .records
            .complete_active_runs(workflow_id, execution_state::SUPERSEDED)
            .await?;
        if superseded > 0 {
            tracing::info!(
                workflow_id = %workflow_id,
                count = superseded,
                "Superseded active runs"
            );
        }

        let run = Run::pending(workflow_id.clone(), run_number);
        self.records.insert_run(&run).await?;

        tracing::info!(workflow_id = %workflow_id, run_number, "Run started");
        Ok(run)
    }

    /// Record a trigger that never produced a run
    pub async fn record_trigger_failure(
        &self,
        workflow_id: &WorkflowId,
        details: &str,
    ) -> DispatchResult<Run> {
        let run = Run::trigger_failed(workflow_id.clone(), details);
        self.records.insert_run(&run).await?;
        Ok(run)
    }

    /// Mark a run finished, freeing its concurrency slot
    pub async fn complete_run(
        &self,
        workflow_id: &WorkflowId,
        run_number: i64,
        state: Option<&str>,
        failure_summary: Option<&str>,
    ) -> DispatchResult<Run> {
        let mut run = self
            .records
            .find_run(workflow_id, run_number)
            .await?
            .ok_or_else(|| DispatchError::RunNotFound {
                workflow_id: workflow_id.clone(),
                run_number,
            })?;

        let state = state.unwrap_or(execution_state::COMPLETED);
        self.records
            .complete_run(workflow_id, run_number, state, failure_summary)
            .await?;

        run.status = RunStatus::Completed;
        run.execution_state = state.to_string();
        run.completed_at = Some(Utc::now());
        if let Some(summary) = failure_summary {
            run.failure_summary = Some(summary.to_string());
        }

        tracing::info!(workflow_id = %workflow_id, run_number, state, "Run completed");
        Ok(run)
    }
}
