//! Fallback ladder: runner → direct remote → simulation

use serde_json::{Map, Value};
use std::sync::Arc;

use super::capability::{BackendCapability, detect_capability};
use super::catalog::Operation;
use super::direct::{RemoteExecutor, probe_reachability, run_direct_tier};
use super::job::{CancelFlag, ExecutionJob};
use super::runner::{RunnerOutcome, run_runner_tier, runner_program};
use super::simulate::run_simulation;
use super::ExecutionError;
use crate::config::{DirectConfig, RunnerConfig};
use crate::inventory::TargetSet;
use crate::probe::SshExecutor;

pub struct Orchestrator {
    runner: RunnerConfig,
    direct: DirectConfig,
    executor: Arc<dyn RemoteExecutor>,
}

impl Orchestrator {
    pub fn new(runner: RunnerConfig, direct: DirectConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            runner,
            direct,
            executor,
        }
    }

    /// Orchestrator whose direct tier speaks SSH.
    pub fn with_ssh(runner: RunnerConfig, direct: DirectConfig) -> Self {
        let executor = Arc::new(SshExecutor::new(direct.connect_timeout));
        Self::new(runner, direct, executor)
    }

    pub fn runner_config(&self) -> &RunnerConfig {
        &self.runner
    }

    /// Check the runner program `operation` needs.
    pub async fn detect(&self, operation: &Operation) -> BackendCapability {
        detect_capability(runner_program(&self.runner, operation), self.runner.check_timeout).await
    }

    /// Detect the backend, then run. See [`Orchestrator::run_operation_with`].
    pub async fn run_operation(
        &self,
        operation: &Operation,
        targets: &TargetSet,
        extra_params: &Map<String, Value>,
        cancel: &CancelFlag,
    ) -> Result<ExecutionJob, ExecutionError> {
        if targets.is_empty() {
            return Err(ExecutionError::EmptyTargetSet);
        }
        let capability = self.detect(operation).await;
        self.run_operation_with(capability, operation, targets, extra_params, cancel)
            .await
    }

    /// Run `operation` with an already known backend capability.
    ///
    /// Only an empty target set is an error; everything else, including
    /// per-device failures and timeouts, is reported on the returned job.
    pub async fn run_operation_with(
        &self,
        capability: BackendCapability,
        operation: &Operation,
        targets: &TargetSet,
        extra_params: &Map<String, Value>,
        cancel: &CancelFlag,
    ) -> Result<ExecutionJob, ExecutionError> {
        if targets.is_empty() {
            return Err(ExecutionError::EmptyTargetSet);
        }

        let mut job = ExecutionJob::new(operation.label(), targets.len());
        crate::log_stderr!(
            "Job {}: '{}' on {} devices",
            job.job_id,
            job.operation,
            targets.len()
        );

        let fallback_reason = match run_runner_tier(
            &mut job,
            &capability,
            operation,
            targets,
            extra_params,
            &self.runner,
            cancel,
        )
        .await
        {
            RunnerOutcome::Ran(_) => {
                log_finished(&job);
                return Ok(job);
            }
            RunnerOutcome::Unavailable(reason) => format!("runner unavailable: {}", reason),
            RunnerOutcome::LaunchFailed(reason) => format!("runner launch failed: {}", reason),
        };
        crate::log_stderr!("Job {}: {}, trying direct execution", job.job_id, fallback_reason);

        let reachable = probe_reachability(targets, self.direct.reachability_timeout).await;
        let reachable_count = reachable.iter().filter(|r| **r).count();

        if reachable_count > 0 {
            crate::log_debug!(
                "Job {}: {} of {} devices reachable",
                job.job_id,
                reachable_count,
                targets.len()
            );
            run_direct_tier(
                &mut job,
                targets,
                &reachable,
                operation.direct_commands(),
                extra_params,
                Arc::clone(&self.executor),
                &self.direct,
                cancel,
            )
            .await;
        } else {
            let reason = format!("{}; no device reachable", fallback_reason);
            run_simulation(&mut job, targets, &reason, cancel);
        }

        log_finished(&job);
        Ok(job)
    }
}

fn log_finished(job: &ExecutionJob) {
    crate::log_stderr!(
        "Job {} finished: {} in {} mode, {}/{} devices ({} ms)",
        job.job_id,
        job.status(),
        job.execution_mode()
            .map(|m| m.as_str())
            .unwrap_or("none"),
        job.devices_successful,
        job.devices_attempted,
        job.duration_ms
    );
}
