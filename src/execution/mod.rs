//! Execution Orchestrator
//!
//! Runs an operation against a target set through a fallback ladder:
//! the external runner, then direct per-device remote execution, then a
//! labelled simulation when no device can be reached.

pub mod capability;
pub mod catalog;
pub mod direct;
pub mod job;
pub mod orchestrator;
pub mod runner;
pub mod simulate;

pub use capability::{BackendCapability, detect_capability};
pub use catalog::{Operation, PlaybookInfo, list_playbooks, write_builtin_playbooks};
pub use direct::{CommandOutput, RemoteError, RemoteExecutor};
pub use job::{CancelFlag, DeviceResult, ExecutionJob, ExecutionMode, JobStatus};
pub use orchestrator::Orchestrator;
pub use runner::RunnerOutcome;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("target set is empty")]
    EmptyTargetSet,
    #[error("job cannot move from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}
