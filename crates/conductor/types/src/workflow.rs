//! Workflow records

use crate::ids::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target environment of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

impl Environment {
    /// Normalise a caller-supplied value: only `"staging"` selects staging.
    pub fn normalize(value: Option<&str>) -> Self {
        match value {
            Some("staging") => Environment::Staging,
            _ => Environment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical execution lineage for an app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: WorkflowId,
    pub app_name: String,
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        workflow_id: WorkflowId,
        app_name: impl Into<String>,
        connection_id: Option<String>,
        environment: Environment,
    ) -> Self {
        Self {
            workflow_id,
            app_name: app_name.into(),
            connection_id,
            environment,
            created_at: Utc::now(),
        }
    }
}
