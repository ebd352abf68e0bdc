//! Conductor daemon library
//!
//! Admission control, queueing and run bookkeeping for workflows executed by
//! an external execution API:
//! - Store client with memory, REST and PostgreSQL backends
//! - Admission controller, run sequencer and trigger orchestrator
//! - Queue drainer
//! - REST API and server lifecycle

pub mod admission;
pub mod api;
pub mod config;
pub mod config_updater;
pub mod dispatcher;
pub mod drainer;
pub mod error;
pub mod execution;
pub mod orchestrator;
pub mod sequencer;
pub mod server;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::DaemonConfig;
pub use dispatcher::{Dispatcher, Submission};
pub use error::{ApiError, DaemonError, DispatchError, StorageError};
pub use execution::{ExecutionApi, IntegratorClient};
pub use server::Server;
pub use storage::{InMemoryStore, Records, StoreClient};
