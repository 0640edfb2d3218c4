//! Asynchronous operation tracking for shipwright.
//!
//! An accepted build, deploy or build-and-deploy request becomes an
//! [`Operation`] in the [`OperationRegistry`]. The [`OperationRunner`] drives
//! each operation through `pending -> running -> completed | failed` on its own
//! worker thread, while every call into the build executor goes through a single
//! [`ExecutorGate`] so at most one executor call runs at any instant.

pub mod concurrency;
pub mod lifecycle;
pub mod operation;
pub mod registry;
pub mod runner;

pub use concurrency::{install_signal_handler, shutdown_requested, ExecutorGate};
pub use lifecycle::validate_transition;
pub use operation::{Operation, OperationId, OperationKind, OperationParams, OperationStatus, Phase};
pub use registry::OperationRegistry;
pub use runner::{Launch, OperationRunner};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("operation not found: {0}")]
    OperationNotFound(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Executor(#[from] shipwright_executor::ExecutorError),
    #[error("failed to start operation worker: {0}")]
    Spawn(#[source] std::io::Error),
}
