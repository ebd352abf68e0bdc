//! Entry point for every client operation
//!
//! Wires admission, orchestration, config updates and run completion
//! together, and nudges the queue drainer whenever capacity may have
//! changed. The REST layer talks only to [`Dispatcher`].

use crate::admission::{AdmissionController, Decision};
use crate::config_updater::ConfigUpdater;
use crate::drainer::QueueDrainer;
use crate::error::{DispatchError, DispatchResult};
use crate::execution::{
    DashboardResponse, ExecutionApi, RetryRequest, RunDefaults, TriggerRequest, UpstreamError,
};
use crate::orchestrator::{RetryOutcome, TriggerOrchestrator, TriggerOutcome};
use crate::storage::Records;
use conductor_types::{ConfigEntry, Run, WorkflowId};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of submitting a trigger request
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Triggered(TriggerOutcome),
    Queued {
        position: i64,
        active: usize,
        limit: i64,
    },
    Rejected {
        workflow_id: WorkflowId,
    },
}

/// Snapshot of scheduler load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStatus {
    pub active: usize,
    pub max_concurrent: i64,
    pub queued: usize,
    pub backend: &'static str,
}

pub struct Dispatcher {
    records: Records,
    admission: AdmissionController,
    orchestrator: Arc<TriggerOrchestrator>,
    config: ConfigUpdater,
    api: Arc<dyn ExecutionApi>,
    drainer: Option<Arc<QueueDrainer>>,
}

impl Dispatcher {
    pub fn new(
        records: Records,
        api: Arc<dyn ExecutionApi>,
        defaults: RunDefaults,
        default_max_concurrent: i64,
    ) -> Self {
        let admission = AdmissionController::new(records.clone(), default_max_concurrent);
        let orchestrator = Arc::new(TriggerOrchestrator::new(
            records.clone(),
            api.clone(),
            defaults,
        ));
        let config = ConfigUpdater::new(records.clone(), admission.clone());

        Self {
            records,
            admission,
            orchestrator,
            config,
            api,
            drainer: None,
        }
    }

    /// Attach the drainer that should be nudged when capacity changes
    pub fn with_drainer(mut self, drainer: Arc<QueueDrainer>) -> Self {
        self.drainer = Some(drainer);
        self
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn orchestrator(&self) -> Arc<TriggerOrchestrator> {
        self.orchestrator.clone()
    }

    fn nudge(&self) {
        if let Some(drainer) = &self.drainer {
            drainer.nudge();
        }
    }

    /// Admit and, capacity permitting, trigger a new workflow
    pub async fn submit(&self, request: TriggerRequest) -> DispatchResult<Submission> {
        let payload = self.orchestrator.payload_for(&request);

        match self.admission.admit(&request, &payload).await? {
            Decision::Rejected { workflow_id, .. } => Ok(Submission::Rejected { workflow_id }),
            Decision::Queued {
                position,
                active,
                limit,
            } => Ok(Submission::Queued {
                position,
                active,
                limit,
            }),
            Decision::Proceed { .. } => {
                Ok(Submission::Triggered(self.orchestrator.run(&payload).await))
            }
        }
    }

    pub async fn retry(&self, request: RetryRequest) -> DispatchResult<RetryOutcome> {
        self.orchestrator.retry(&request).await
    }

    pub async fn update_config(&self, key: &str, value: &Value) -> DispatchResult<ConfigEntry> {
        let entry = self.config.set_config(key, value).await?;
        self.nudge();
        Ok(entry)
    }

    pub async fn complete_run(
        &self,
        workflow_id: &WorkflowId,
        run_number: i64,
        execution_state: Option<&str>,
        failure_summary: Option<&str>,
    ) -> DispatchResult<Run> {
        let run = self
            .orchestrator
            .sequencer()
            .complete_run(workflow_id, run_number, execution_state, failure_summary)
            .await?;
        self.nudge();
        Ok(run)
    }

    /// Remove a queued request before it is dispatched
    pub async fn cancel_queued(&self, position: i64) -> DispatchResult<()> {
        if !self.records.claim_queued(position).await? {
            return Err(DispatchError::QueueEntryNotFound(position));
        }
        tracing::info!(position, "Queued workflow cancelled");
        self.nudge();
        Ok(())
    }

    pub async fn detail(
        &self,
        workflow_id: &str,
        run_number: &Value,
    ) -> Result<DashboardResponse, UpstreamError> {
        self.api.dashboard_data(workflow_id, run_number).await
    }

    pub async fn status(&self) -> DispatchResult<DispatchStatus> {
        Ok(DispatchStatus {
            active: self.records.count_active_runs().await?,
            max_concurrent: self.config.get_config().await,
            queued: self.records.count_queued().await?,
            backend: self.records.backend(),
        })
    }
}
