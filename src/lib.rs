//! netauto-core: device automation and security assessment
//!
//! - Inventory building from loosely-typed device records
//! - TCP port scanning with banner capture
//! - Default-credential probing over SSH
//! - Deduplicated security alerts in SQLite
//! - Operation execution with runner, direct and simulated fallbacks

pub mod alerts;
pub mod app;
pub mod cli_adapter;
pub mod command;
pub mod command_handlers;
pub mod config;
pub mod database;
pub mod execution;
pub mod inventory;
pub mod logging;
pub mod models;
pub mod probe;
pub mod scanner;
pub mod security;

mod cli;

pub use alerts::{Alert, AlertCategory, AlertError, AlertSeverity, AlertStatus, AlertStore};
pub use app::{
    AppCommandResult, AppContext, OutputHook, execute_command_typed, execute_command_with_context,
};
pub use command::AppCommand;
pub use config::{DirectConfig, RunnerConfig, ScanConfig};
pub use database::{AlertRecord, Database, SeverityCounts};
pub use execution::{
    BackendCapability, CancelFlag, ExecutionError, ExecutionJob, ExecutionMode, JobStatus,
    Operation, Orchestrator,
};
pub use inventory::{BuildWarning, InventoryBuild, TargetSet, build_target_set};
pub use models::*;
pub use probe::{Authenticator, AuthOutcome, ProbeError, probe_credentials};
pub use scanner::PortScanner;
pub use security::{BatchSummary, ConfigAuditOutcome, SecurityAssessor, SecurityOverview};

// Re-export logging macros for use across crate
pub use crate::logging::macros;
