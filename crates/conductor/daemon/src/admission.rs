//! Admission control
//!
//! Decides per trigger request whether to run now, park the request in the
//! queue, or reject it. All state is read fresh from the store; there is no
//! lock around the decision, so concurrent requests may briefly exceed the
//! cap.

use crate::error::DispatchResult;
use crate::execution::{RunRequest, TriggerRequest};
use crate::storage::{to_row, Records};
use conductor_types::{ConfigKey, QueueEntry, WorkflowId};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The app already has an active run
    AlreadyRunning,
}

/// Result of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed {
        active: usize,
        limit: i64,
    },
    /// The request was stored in the queue at `position`
    Queued {
        position: i64,
        active: usize,
        limit: i64,
    },
    Rejected {
        reason: RejectReason,
        workflow_id: WorkflowId,
    },
}

/// RUN / QUEUE / REJECT gate in front of the trigger orchestrator
#[derive(Clone)]
pub struct AdmissionController {
    records: Records,
    default_limit: i64,
}

impl AdmissionController {
    pub fn new(records: Records, default_limit: i64) -> Self {
        Self {
            records,
            default_limit,
        }
    }

    /// Effective concurrency cap.
    ///
    /// A missing, invalid or unreadable entry falls back to the default.
    pub async fn max_concurrent(&self) -> i64 {
        match self.records.config_entry(ConfigKey::MaxConcurrent).await {
            Ok(Some(entry)) => entry.as_max_concurrent().unwrap_or_else(|| {
                tracing::warn!(
                    value = %entry.value,
                    default = self.default_limit,
                    "Invalid max_concurrent value, using default"
                );
                self.default_limit
            }),
            Ok(None) => self.default_limit,
            Err(e) => {
                tracing::warn!(error = %e, default = self.default_limit, "Failed to read max_concurrent");
                self.default_limit
            }
        }
    }

    /// Evaluate `request`; `payload` is what gets queued if capacity is exhausted.
    pub async fn admit(
        &self,
        request: &TriggerRequest,
        payload: &RunRequest,
    ) -> DispatchResult<Decision> {
        if let Some(run) = self.records.active_run_for_app(&request.app_name).await? {
            tracing::info!(
                app_name = %request.app_name,
                workflow_id = %run.workflow_id,
                "Rejecting trigger, app already running"
            );
            return Ok(Decision::Rejected {
                reason: RejectReason::AlreadyRunning,
                workflow_id: run.workflow_id,
            });
        }

        let limit = self.max_concurrent().await;
        let active = self.records.count_active_runs().await?;

        if (active as i64) < limit {
            return Ok(Decision::Proceed { active, limit });
        }

        let position = self.records.next_queue_position().await?;
        let entry = QueueEntry::new(
            request.app_name.clone(),
            request.connection_id.clone(),
            Value::Object(to_row(payload)?),
            position,
        );
        self.records.enqueue(&entry).await?;

        tracing::info!(
            app_name = %request.app_name,
            position,
            active,
            limit,
            "Workflow queued"
        );

        Ok(Decision::Queued {
            position,
            active,
            limit,
        })
    }
}
