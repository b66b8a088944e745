//! Execution job record and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Timeout | JobStatus::Error
        )
    }

    /// pending → running → {success | failed | timeout | error}
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => next == JobStatus::Running,
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier a job ran in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    RealRunner,
    DirectRemote,
    Simulation,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::RealRunner => "real_runner",
            ExecutionMode::DirectRemote => "direct_remote",
            ExecutionMode::Simulation => "simulation",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one device within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceResult {
    pub hostname: String,
    pub host: String,
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl DeviceResult {
    pub fn success(hostname: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            host: host.into(),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            return_code: Some(0),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failure(
        hostname: impl Into<String>,
        host: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            host: host.into(),
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

/// One run of an operation against a target set.
///
/// The mode is fixed by [`ExecutionJob::start`]; a job never moves between
/// tiers once started, and terminal states are final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub job_id: String,
    pub operation: String,
    pub target_count: usize,
    execution_mode: Option<ExecutionMode>,
    status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub device_results: Vec<DeviceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    pub devices_attempted: usize,
    pub devices_successful: usize,
    pub message: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl ExecutionJob {
    pub fn new(operation: impl Into<String>, target_count: usize) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            target_count,
            execution_mode: None,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: 0,
            device_results: Vec::new(),
            return_code: None,
            devices_attempted: 0,
            devices_successful: 0,
            message: String::new(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn execution_mode(&self) -> Option<ExecutionMode> {
        self.execution_mode
    }

    /// pending → running in `mode`
    pub fn start(&mut self, mode: ExecutionMode) -> Result<(), ExecutionError> {
        self.transition(JobStatus::Running)?;
        self.execution_mode = Some(mode);
        self.started_at = Some(Utc::now());
        crate::log_debug!("Job {} running in {} mode", self.job_id, mode);
        Ok(())
    }

    /// running → terminal, recording per-device tallies
    pub fn finish(
        &mut self,
        status: JobStatus,
        message: impl Into<String>,
    ) -> Result<(), ExecutionError> {
        if !status.is_terminal() {
            return Err(ExecutionError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        let finished = Utc::now();
        self.finished_at = Some(finished);
        if self.duration_ms == 0
            && let Some(started) = self.started_at
        {
            self.duration_ms = (finished - started).num_milliseconds().max(0) as u64;
        }
        self.devices_attempted = self.device_results.len();
        self.devices_successful = self.device_results.iter().filter(|r| r.success).count();
        self.message = message.into();
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Set an explicit duration (simulated jobs report synthetic timing).
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis() as u64;
    }

    /// Succeeded, but not on every device
    pub fn is_partial(&self) -> bool {
        self.status == JobStatus::Success && self.devices_successful < self.devices_attempted
    }
}

/// Cooperative cancellation shared between a caller and a running job
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag (e.g. one owned by the app context)
    pub fn from_shared(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
