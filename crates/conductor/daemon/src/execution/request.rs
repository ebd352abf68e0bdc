//! Execution request construction
//!
//! Callers describe *what* to run ([`TriggerRequest`], [`RetryRequest`]);
//! the fixed operational knobs come from [`RunDefaults`]. Both are folded
//! into the canonical [`RunRequest`] sent to the execution API and stored
//! verbatim in the queue.

use conductor_types::{Environment, WorkflowId};
use serde::{Deserialize, Serialize};

/// Feature toggles forwarded with every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub tracing_enable_workflow_span: bool,
    #[serde(default)]
    pub debug_logs: bool,
    #[serde(default = "default_max_parallel_agents")]
    pub max_parallel_agents: u32,
    #[serde(default)]
    pub ecs_cpu_override: Option<u32>,
    #[serde(default)]
    pub ecs_memory_override: Option<u32>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            tracing_enable_workflow_span: false,
            debug_logs: false,
            max_parallel_agents: default_max_parallel_agents(),
            ecs_cpu_override: None,
            ecs_memory_override: None,
        }
    }
}

/// Operational parameters applied to every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDefaults {
    #[serde(default = "default_model_provider")]
    pub model_provider: String,
    #[serde(default = "default_true")]
    pub force_run: bool,
    #[serde(default = "default_timeout_hours")]
    pub timeout_hours: u32,
    #[serde(default = "default_integrator_branch")]
    pub integrator_branch: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub slack_thread_id: String,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            model_provider: default_model_provider(),
            force_run: true,
            timeout_hours: default_timeout_hours(),
            integrator_branch: default_integrator_branch(),
            base_branch: default_base_branch(),
            labels: Vec::new(),
            slack_thread_id: String::new(),
            feature_flags: FeatureFlags::default(),
        }
    }
}

fn default_model_provider() -> String {
    "claude".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_hours() -> u32 {
    36
}

fn default_integrator_branch() -> String {
    "next".to_string()
}

fn default_base_branch() -> String {
    "master".to_string()
}

fn default_max_parallel_agents() -> u32 {
    40
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Canonical body of `POST /workflows/create-app/run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub model_provider: String,
    pub force_run: bool,
    pub timeout_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_workflow_id: Option<WorkflowId>,
    pub env: Environment,
    pub integrator_branch: String,
    pub app_name: String,
    pub base_branch: String,
    pub labels: Vec<String>,
    pub slack_thread_id: String,
    pub feature_flags: FeatureFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finder_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub test_all_actions: bool,
}

impl RunRequest {
    fn base(defaults: &RunDefaults, app_name: &str, env: Environment) -> Self {
        Self {
            model_provider: defaults.model_provider.clone(),
            force_run: defaults.force_run,
            timeout_hours: defaults.timeout_hours,
            previous_workflow_id: None,
            env,
            integrator_branch: defaults.integrator_branch.clone(),
            app_name: app_name.to_string(),
            base_branch: defaults.base_branch.clone(),
            labels: defaults.labels.clone(),
            slack_thread_id: defaults.slack_thread_id.clone(),
            feature_flags: defaults.feature_flags.clone(),
            connection_id: None,
            finder_instructions: None,
            test_all_actions: false,
        }
    }
}

/// Optional knobs a caller may set on a fresh trigger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerParams {
    pub finder_instructions: Option<String>,
    pub test_all_actions: bool,
}

/// A request to start a new workflow for an app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub app_name: String,
    pub connection_id: Option<String>,
    pub environment: Environment,
    pub params: TriggerParams,
}

impl TriggerRequest {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            connection_id: None,
            environment: Environment::Production,
            params: TriggerParams::default(),
        }
    }

    /// Empty connection ids are treated as absent
    pub fn with_connection(mut self, connection_id: Option<String>) -> Self {
        self.connection_id = non_empty(connection_id);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_params(mut self, params: TriggerParams) -> Self {
        self.params = TriggerParams {
            finder_instructions: non_empty(params.finder_instructions),
            test_all_actions: params.test_all_actions,
        };
        self
    }

    pub fn to_run_request(&self, defaults: &RunDefaults) -> RunRequest {
        let mut request = RunRequest::base(defaults, &self.app_name, self.environment);
        // blank strings never reach the API
        request.connection_id = non_empty(self.connection_id.clone());
        request.finder_instructions = non_empty(self.params.finder_instructions.clone());
        request.test_all_actions = self.params.test_all_actions;
        request
    }
}

/// A request to re-run an existing workflow lineage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub app_name: String,
    pub prior_workflow_id: WorkflowId,
    pub connection_id: Option<String>,
    pub environment: Environment,
}

impl RetryRequest {
    pub fn new(app_name: impl Into<String>, prior_workflow_id: WorkflowId) -> Self {
        Self {
            app_name: app_name.into(),
            prior_workflow_id,
            connection_id: None,
            environment: Environment::Production,
        }
    }

    pub fn with_connection(mut self, connection_id: Option<String>) -> Self {
        self.connection_id = non_empty(connection_id);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn to_run_request(&self, defaults: &RunDefaults) -> RunRequest {
        let mut request = RunRequest::base(defaults, &self.app_name, self.environment);
        request.previous_workflow_id = Some(self.prior_workflow_id.clone());
        request.connection_id = non_empty(self.connection_id.clone());
        request
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
