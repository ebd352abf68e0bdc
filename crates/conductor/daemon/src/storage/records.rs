//! Typed access to the four record collections
//!
//! Business components never build raw queries; they go through
//! [`Records`], which maps rows to `conductor-types` records.

use super::traits::*;
use crate::error::StorageError;
use chrono::Utc;
use conductor_types::{
    ConfigEntry, ConfigKey, QueueEntry, Run, RunStatus, Workflow, WorkflowId,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Repository over a [`StoreClient`]
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn StoreClient>,
}

impl Records {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    // Workflows

    pub async fn insert_workflow(&self, workflow: &Workflow) -> StorageResult<()> {
        self.store
            .insert(Collection::Workflows, to_row(workflow)?)
            .await
    }

    pub async fn workflow(&self, workflow_id: &WorkflowId) -> StorageResult<Option<Workflow>> {
        let query = Query::new()
            .filter(Filter::eq("workflow_id", workflow_id.as_str()))
            .limit(1);
        let rows = self.store.select(Collection::Workflows, &query).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    /// Ids of every workflow lineage recorded for `app_name`
    pub async fn workflow_ids_for_app(&self, app_name: &str) -> StorageResult<Vec<WorkflowId>> {
        let query = Query::new().filter(Filter::eq("app_name", app_name));
        let rows = self.store.select(Collection::Workflows, &query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("workflow_id").and_then(Value::as_str))
            .map(WorkflowId::from)
            .collect())
    }

    // Runs

    pub async fn insert_run(&self, run: &Run) -> StorageResult<()> {
        self.store.insert(Collection::Runs, to_row(run)?).await
    }

    /// Any active run belonging to a workflow of `app_name`
    pub async fn active_run_for_app(&self, app_name: &str) -> StorageResult<Option<Run>> {
        let ids = self.workflow_ids_for_app(app_name).await?;
        if ids.is_empty() {
            return Ok(None);
        }

        let query = Query::new()
            .filter(Filter::is_in(
                "workflow_id",
                ids.iter().map(|id| id.as_str().to_string()),
            ))
            .filter(Filter::eq("status", RunStatus::Active.as_str()))
            .limit(1);
        let rows = self.store.select(Collection::Runs, &query).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    pub async fn active_runs(&self) -> StorageResult<Vec<Run>> {
        let query = Query::new().filter(Filter::eq("status", RunStatus::Active.as_str()));
        let rows = self.store.select(Collection::Runs, &query).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn count_active_runs(&self) -> StorageResult<usize> {
        Ok(self.active_runs().await?.len())
    }

    /// App names that currently hold an active run
    pub async fn active_apps(&self) -> StorageResult<BTreeSet<String>> {
        let ids: BTreeSet<String> = self
            .active_runs()
            .await?
            .into_iter()
            .map(|run| run.workflow_id.as_str().to_string())
            .collect();
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let query = Query::new().filter(Filter::is_in("workflow_id", ids));
        let rows = self.store.select(Collection::Workflows, &query).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("app_name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    pub async fn max_run_number(&self, workflow_id: &WorkflowId) -> StorageResult<Option<i64>> {
        let query = Query::new()
            .filter(Filter::eq("workflow_id", workflow_id.as_str()))
            .order_by("run_number", Direction::Desc)
            .limit(1);
        let rows = self.store.select(Collection::Runs, &query).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("run_number"))
            .and_then(Value::as_i64))
    }

    pub async fn runs_for_workflow(&self, workflow_id: &WorkflowId) -> StorageResult<Vec<Run>> {
        let query = Query::new()
            .filter(Filter::eq("workflow_id", workflow_id.as_str()))
            .order_by("run_number", Direction::Asc);
        let rows = self.store.select(Collection::Runs, &query).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn find_run(
        &self,
        workflow_id: &WorkflowId,
        run_number: i64,
    ) -> StorageResult<Option<Run>> {
        let query = Query::new()
            .filter(Filter::eq("workflow_id", workflow_id.as_str()))
            .filter(Filter::eq("run_number", run_number))
            .limit(1);
        let rows = self.store.select(Collection::Runs, &query).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    /// Mark one run completed
    pub async fn complete_run(
        &self,
        workflow_id: &WorkflowId,
        run_number: i64,
        execution_state: &str,
        failure_summary: Option<&str>,
    ) -> StorageResult<u64> {
        let filters = [
            Filter::eq("workflow_id", workflow_id.as_str()),
            Filter::eq("run_number", run_number),
        ];
        self.store
            .update(
                Collection::Runs,
                &filters,
                completion_patch(execution_state, failure_summary),
            )
            .await
    }

    /// Complete every still-active run of a workflow with `execution_state`
    pub async fn complete_active_runs(
        &self,
        workflow_id: &WorkflowId,
        execution_state: &str,
    ) -> StorageResult<u64> {
        let filters = [
            Filter::eq("workflow_id", workflow_id.as_str()),
            Filter::eq("status", RunStatus::Active.as_str()),
        ];
        self.store
            .update(
                Collection::Runs,
                &filters,
                completion_patch(execution_state, None),
            )
            .await
    }

    // Config

    pub async fn config_entry(&self, key: ConfigKey) -> StorageResult<Option<ConfigEntry>> {
        let query = Query::new()
            .filter(Filter::eq("key", key.as_str()))
            .limit(1);
        let rows = self.store.select(Collection::Config, &query).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    /// Overwrite the value of an existing entry; returns the number of rows changed
    pub async fn update_config(&self, key: ConfigKey, value: Value) -> StorageResult<u64> {
        let mut patch = Row::new();
        patch.insert("value".to_string(), value);
        self.store
            .update(Collection::Config, &[Filter::eq("key", key.as_str())], patch)
            .await
    }

    /// Insert `entry` unless its key already exists; returns whether a row was written
    pub async fn seed_config(&self, entry: &ConfigEntry) -> StorageResult<bool> {
        let query = Query::new()
            .filter(Filter::eq("key", entry.key.as_str()))
            .limit(1);
        if !self.store.select(Collection::Config, &query).await?.is_empty() {
            return Ok(false);
        }
        self.store.insert(Collection::Config, to_row(entry)?).await?;
        Ok(true)
    }

    // Queue

    pub async fn next_queue_position(&self) -> StorageResult<i64> {
        self.store
            .next_sequence(Collection::QueuedWorkflows, "position")
            .await
    }

    pub async fn enqueue(&self, entry: &QueueEntry) -> StorageResult<()> {
        self.store
            .insert(Collection::QueuedWorkflows, to_row(entry)?)
            .await
    }

    /// Every queued entry, lowest position first
    pub async fn queued(&self) -> StorageResult<Vec<QueueEntry>> {
        let query = Query::new().order_by("position", Direction::Asc);
        let rows = self.store.select(Collection::QueuedWorkflows, &query).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn count_queued(&self) -> StorageResult<usize> {
        let rows = self
            .store
            .select(Collection::QueuedWorkflows, &Query::new())
            .await?;
        Ok(rows.len())
    }

    /// Remove the entry at `position`; `false` means it was already gone
    pub async fn claim_queued(&self, position: i64) -> StorageResult<bool> {
        let removed = self
            .store
            .delete(
                Collection::QueuedWorkflows,
                &[Filter::eq("position", position)],
            )
            .await?;
        Ok(removed > 0)
    }
}

fn completion_patch(execution_state: &str, failure_summary: Option<&str>) -> Row {
    let mut patch = Row::new();
    patch.insert("status".into(), json!(RunStatus::Completed.as_str()));
    patch.insert("execution_state".into(), json!(execution_state));
    patch.insert("completed_at".into(), json!(Utc::now()));
    if let Some(summary) = failure_summary {
        patch.insert("failure_summary".into(), json!(summary));
    }
    patch
}

/// Serialize a record into a store row
pub fn to_row<T: Serialize>(record: &T) -> StorageResult<Row> {
    match serde_json::to_value(record) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StorageError::InvalidData(format!(
            "record serialized to non-object: {}",
            other
        ))),
        Err(e) => Err(StorageError::InvalidData(format!(
            "json serialize error: {}",
            e
        ))),
    }
}

/// Deserialize a store row into a record
pub fn from_row<T: DeserializeOwned>(row: Row) -> StorageResult<T> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
}
