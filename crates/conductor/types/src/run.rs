//! Run records
//!
//! A run is one attempt within a workflow lineage. Run numbers are positive,
//! unique per workflow and strictly increasing. At most one run of a given
//! workflow is `active` at a time.

use crate::ids::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known execution state tokens. The field itself is free-form.
pub mod execution_state {
    pub const PENDING: &str = "PENDING";
    pub const TRIGGER_FAILED: &str = "TRIGGER_FAILED";
    pub const SUPERSEDED: &str = "SUPERSEDED";
    pub const COMPLETED: &str = "COMPLETED";
}

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Currently executing, counted against the concurrency cap
    Active,
    Completed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub workflow_id: WorkflowId,
    pub run_number: i64,
    pub status: RunStatus,
    pub execution_state: String,
    #[serde(default)]
    pub failure_summary: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// A freshly triggered run awaiting execution
    pub fn pending(workflow_id: WorkflowId, run_number: i64) -> Self {
        Self {
            workflow_id,
            run_number,
            status: RunStatus::Active,
            execution_state: execution_state::PENDING.to_string(),
            failure_summary: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A run that never started because the trigger call failed
    pub fn trigger_failed(workflow_id: WorkflowId, details: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            run_number: 1,
            status: RunStatus::Completed,
            execution_state: execution_state::TRIGGER_FAILED.to_string(),
            failure_summary: Some(details.into()),
            started_at: now,
            completed_at: Some(now),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }
}
