//! Conductor core types
//!
//! Records shared by every Conductor component:
//! - Workflows and their runs
//! - Deferred trigger requests waiting for capacity
//! - Singleton configuration entries

pub mod ids;
pub mod queue;
pub mod run;
pub mod settings;
pub mod workflow;

pub use ids::WorkflowId;
pub use queue::QueueEntry;
pub use run::{execution_state, Run, RunStatus};
pub use settings::{positive_integer, ConfigEntry, ConfigKey, UnknownConfigKey, DEFAULT_MAX_CONCURRENT};
pub use workflow::{Environment, Workflow};
