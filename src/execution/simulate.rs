//! Simulation tier: last resort when nothing can be contacted

use std::time::Duration;

use super::job::{CancelFlag, DeviceResult, ExecutionJob, ExecutionMode, JobStatus};
use crate::config::SIMULATED_DURATION_MS;
use crate::inventory::TargetSet;

/// Complete `job` without contacting any device.
///
/// Every target is echoed back as a successful, clearly labelled simulated
/// result with a fixed synthetic duration.
pub fn run_simulation(
    job: &mut ExecutionJob,
    targets: &TargetSet,
    reason: &str,
    cancel: &CancelFlag,
) -> JobStatus {
    if let Err(e) = job.start(ExecutionMode::Simulation) {
        crate::log_error!("Job {} could not start simulation: {}", job.job_id, e);
        return job.status();
    }

    if cancel.is_cancelled() {
        if let Err(e) = job.finish(JobStatus::Error, "Job cancelled") {
            crate::log_error!("Job {} could not finish: {}", job.job_id, e);
        }
        return job.status();
    }

    job.device_results = targets
        .iter()
        .map(|device| {
            let mut result = DeviceResult::success(&device.hostname, &device.host);
            result.stdout = format!("[simulated] {} on {}", job.operation, device.hostname);
            result
        })
        .collect();
    job.set_duration(Duration::from_millis(SIMULATED_DURATION_MS));

    let message = format!(
        "Simulated {} on {} devices ({})",
        job.operation,
        targets.len(),
        reason
    );
    crate::log_stderr!("Job {}: {}", job.job_id, message);

    if let Err(e) = job.finish(JobStatus::Success, message) {
        crate::log_error!("Job {} could not finish: {}", job.job_id, e);
    }
    job.status()
}
