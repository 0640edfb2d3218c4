//! Build executors for shipwright.
//!
//! This crate implements the collaborator that does the actual work: the
//! `BuildExecutor` trait with a process-backed `DockerExecutor` (docker build,
//! registry login/push, kubectl apply and status queries) and an in-memory
//! `MockExecutor` for tests and dry runs. It also provides the structured
//! reports every executor call returns, a cross-process working-directory lock,
//! and prerequisite checks for the external tools.

pub mod commands;
pub mod docker;
pub mod executor;
pub mod lock;
pub mod mock;
pub mod prereq;
pub mod report;

pub use docker::DockerExecutor;
pub use executor::{select_executor, BuildExecutor};
pub use lock::WorkdirLock;
pub use mock::{CallJournal, CallKind, CallRecord, MockExecutor};
pub use prereq::{check_prereqs, format_missing, MissingPrereq};
pub use report::{ComponentState, ComponentStatus, ComponentStatusMap, ExecReport, ExecStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("component not found: {0}")]
    UnknownComponent(String),
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("workdir lock: {0}")]
    Lock(String),
    #[error("executor '{0}' is not available")]
    Unavailable(String),
    #[error("executor fault: {0}")]
    Fault(String),
}
