//! Runner tier: hands the job to the external automation runner

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::capability::BackendCapability;
use super::catalog::{Operation, ensure_builtin_playbook};
use super::job::{CancelFlag, DeviceResult, ExecutionJob, ExecutionMode, JobStatus};
use crate::config::RunnerConfig;
use crate::inventory::{TargetSet, render_inventory};

/// How long to wait for output pipes to drain after the child is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the runner tier left the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerOutcome {
    /// Backend not installed or not working; the job was never started
    Unavailable(String),
    /// Backend present but the process could not be launched; the job was
    /// never started
    LaunchFailed(String),
    /// The runner ran and the job is terminal with this status
    Ran(JobStatus),
}

struct LaunchedRunner {
    child: Child,
    // Dropping this removes the per-job inventory.
    workdir: tempfile::TempDir,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Program the operation needs
pub fn runner_program<'a>(config: &'a RunnerConfig, operation: &Operation) -> &'a str {
    match operation {
        Operation::Playbook { .. } => &config.playbook_program,
        Operation::AdHoc { .. } => &config.adhoc_program,
    }
}

/// Try to run `operation` through the runner.
///
/// The job is moved to running only once the process has been spawned, so
/// `Unavailable` and `LaunchFailed` leave it pending for the next tier.
pub async fn run_runner_tier(
    job: &mut ExecutionJob,
    capability: &BackendCapability,
    operation: &Operation,
    targets: &TargetSet,
    extra_params: &Map<String, Value>,
    config: &RunnerConfig,
    cancel: &CancelFlag,
) -> RunnerOutcome {
    if let BackendCapability::Unavailable { reason } = capability {
        return RunnerOutcome::Unavailable(reason.clone());
    }

    let launched = match launch(operation, targets, extra_params, config).await {
        Ok(launched) => launched,
        Err(reason) => {
            crate::log_warn!("Runner launch failed for job {}: {}", job.job_id, reason);
            return RunnerOutcome::LaunchFailed(reason);
        }
    };

    if let Err(e) = job.start(ExecutionMode::RealRunner) {
        return RunnerOutcome::LaunchFailed(e.to_string());
    }
    crate::log_stderr!(
        "Job {} running '{}' via {} on {} devices",
        job.job_id,
        operation.label(),
        runner_program(config, operation),
        targets.len()
    );

    let status = wait(job, launched, targets, config.job_timeout, cancel).await;
    RunnerOutcome::Ran(status)
}

fn build_args(
    operation: &Operation,
    inventory: &std::path::Path,
    extra_params: &Map<String, Value>,
    config: &RunnerConfig,
) -> Result<Vec<String>, String> {
    let mut args = match operation {
        Operation::Playbook { name, .. } => {
            let playbook: PathBuf = config.playbook_dir.join(name);
            if !playbook.is_file() {
                return Err(format!("playbook {} not found", playbook.display()));
            }
            vec![
                playbook.display().to_string(),
                "-i".to_string(),
                inventory.display().to_string(),
            ]
        }
        Operation::AdHoc { commands } => {
            if commands.is_empty() {
                return Err("ad hoc operation has no commands".to_string());
            }
            vec![
                "all".to_string(),
                "-i".to_string(),
                inventory.display().to_string(),
                "-m".to_string(),
                "raw".to_string(),
                "-a".to_string(),
                commands.join(" && "),
            ]
        }
    };

    if !extra_params.is_empty() {
        let extra = serde_json::to_string(extra_params)
            .map_err(|e| format!("extra parameters not serializable: {}", e))?;
        args.push("--extra-vars".to_string());
        args.push(extra);
    }

    Ok(args)
}

async fn launch(
    operation: &Operation,
    targets: &TargetSet,
    extra_params: &Map<String, Value>,
    config: &RunnerConfig,
) -> Result<LaunchedRunner, String> {
    let workdir = tempfile::Builder::new()
        .prefix("netauto-job-")
        .tempdir()
        .map_err(|e| format!("failed to create job directory: {}", e))?;

    let inventory = render_inventory(targets).map_err(|e| e.to_string())?;
    let inventory_path = workdir.path().join("inventory.yml");
    tokio::fs::write(&inventory_path, inventory)
        .await
        .map_err(|e| format!("failed to write inventory: {}", e))?;

    if let Operation::Playbook { name, .. } = operation {
        ensure_builtin_playbook(&config.playbook_dir, name).map_err(|e| format!("{:#}", e))?;
    }
    let args = build_args(operation, &inventory_path, extra_params, config)?;
    let program = runner_program(config, operation);

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to launch {}: {}", program, e))?;

    let stdout = tokio::spawn(collect(child.stdout.take()));
    let stderr = tokio::spawn(collect(child.stderr.take()));

    Ok(LaunchedRunner {
        child,
        workdir,
        stdout,
        stderr,
    })
}

async fn collect<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        crate::log_debug!("Runner output read ended early: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// A grandchild can hold a pipe open after the runner itself is gone.
async fn drain(handle: JoinHandle<String>) -> String {
    let abort = handle.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, handle).await {
        Ok(Ok(text)) => text,
        _ => {
            abort.abort();
            String::new()
        }
    }
}

async fn wait(
    job: &mut ExecutionJob,
    launched: LaunchedRunner,
    targets: &TargetSet,
    timeout: Duration,
    cancel: &CancelFlag,
) -> JobStatus {
    let LaunchedRunner {
        mut child,
        workdir,
        stdout,
        stderr,
    } = launched;

    let outcome = tokio::select! {
        status = child.wait() => WaitOutcome::Exited(status),
        _ = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
        _ = cancel.cancelled() => WaitOutcome::Cancelled,
    };

    if matches!(outcome, WaitOutcome::TimedOut | WaitOutcome::Cancelled)
        && let Err(e) = child.kill().await
    {
        crate::log_warn!("Failed to kill runner for job {}: {}", job.job_id, e);
    }

    job.stdout = drain(stdout).await;
    job.stderr = drain(stderr).await;

    let (status, message) = match outcome {
        WaitOutcome::Exited(Ok(exit)) => {
            job.return_code = exit.code();
            job.device_results = parse_runner_results(&job.stdout, targets, exit.success());
            if exit.success() {
                (JobStatus::Success, "Runner completed successfully".to_string())
            } else {
                let code = exit
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                (
                    JobStatus::Failed,
                    format!("Runner failed with return code {}", code),
                )
            }
        }
        WaitOutcome::Exited(Err(e)) => (JobStatus::Error, format!("Runner I/O failure: {}", e)),
        WaitOutcome::TimedOut => (
            JobStatus::Timeout,
            format!("Runner exceeded {}s and was stopped", timeout.as_secs_f32()),
        ),
        WaitOutcome::Cancelled => (JobStatus::Error, "Job cancelled".to_string()),
    };

    if job.device_results.is_empty() && status != JobStatus::Success {
        job.device_results = targets
            .iter()
            .map(|d| DeviceResult::failure(&d.hostname, &d.host, message.clone()))
            .collect();
    }

    if let Err(e) = job.finish(status, message) {
        crate::log_error!("Job {} could not finish: {}", job.job_id, e);
    }

    if let Err(e) = workdir.close() {
        crate::log_warn!("Failed to remove job directory for {}: {}", job.job_id, e);
    }

    status
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RecapCounts {
    unreachable: u32,
    failed: u32,
}

/// `r1 : ok=2 changed=0 unreachable=0 failed=0 skipped=0 ...`
fn parse_recap_line(line: &str) -> Option<(String, RecapCounts)> {
    let (host, stats) = line.split_once(" : ")?;
    let mut counts = RecapCounts::default();
    let mut seen = false;
    for field in stats.split_whitespace() {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let Ok(value) = value.parse::<u32>() else {
            continue;
        };
        seen = true;
        match key {
            "unreachable" => counts.unreachable = value,
            "failed" => counts.failed = value,
            _ => {}
        }
    }
    seen.then(|| (host.trim().to_string(), counts))
}

/// `r1 | CHANGED | rc=0 >>`, `r1 | FAILED | rc=1 >>`, `r1 | UNREACHABLE! => {`
fn parse_adhoc_line(line: &str) -> Option<(String, bool, Option<i32>)> {
    let mut parts = line.splitn(3, " | ");
    let host = parts.next()?.trim();
    let state = parts.next()?.trim();
    let rc = parts
        .next()
        .and_then(|rest| rest.trim().strip_prefix("rc="))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|rc| rc.parse::<i32>().ok());

    let state = state.split_whitespace().next().unwrap_or(state);
    let success = match state {
        "SUCCESS" | "CHANGED" => true,
        "FAILED" | "FAILED!" | "UNREACHABLE!" => false,
        _ => return None,
    };
    Some((host.to_string(), success, rc))
}

/// Per-device results from runner output. Devices the output never mentions
/// take the overall result.
pub fn parse_runner_results(
    stdout: &str,
    targets: &TargetSet,
    overall_success: bool,
) -> Vec<DeviceResult> {
    let mut reported: HashMap<String, (bool, Option<i32>)> = HashMap::new();
    let mut in_recap = false;

    for line in stdout.lines() {
        if line.starts_with("PLAY RECAP") {
            in_recap = true;
            continue;
        }
        if in_recap {
            if let Some((host, counts)) = parse_recap_line(line) {
                let success = counts.failed == 0 && counts.unreachable == 0;
                reported.insert(host, (success, None));
            }
        } else if let Some((host, success, rc)) = parse_adhoc_line(line) {
            reported.insert(host, (success, rc));
        }
    }

    targets
        .iter()
        .map(|device| match reported.get(&device.hostname) {
            Some((true, rc)) => {
                let mut result = DeviceResult::success(&device.hostname, &device.host);
                result.return_code = rc.or(Some(0));
                result
            }
            Some((false, rc)) => {
                let mut result = DeviceResult::failure(
                    &device.hostname,
                    &device.host,
                    "runner reported failure",
                );
                result.return_code = *rc;
                result
            }
            None if overall_success => DeviceResult::success(&device.hostname, &device.host),
            None => DeviceResult::failure(
                &device.hostname,
                &device.host,
                "no per-host result in runner output",
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::build_target_set;
    use serde_json::json;

    fn two_targets() -> TargetSet {
        build_target_set(&[
            json!({"hostname": "r1", "host": "10.0.0.1"}),
            json!({"hostname": "r2", "host": "10.0.0.2"}),
        ])
        .targets
    }

    #[test]
    fn recap_marks_failed_and_unreachable_hosts() {
        let stdout = "\
PLAY [all] *****

TASK [ping] *****
ok: [r1]
fatal: [r2]: UNREACHABLE!

PLAY RECAP *****
r1                         : ok=2    changed=0    unreachable=0    failed=0    skipped=0
r2                         : ok=0    changed=0    unreachable=1    failed=0    skipped=0
";
        let results = parse_runner_results(stdout, &two_targets(), false);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[test]
    fn adhoc_lines_carry_return_codes() {
        let stdout = "\
r1 | CHANGED | rc=0 >>
Connection successful
r2 | FAILED | rc=127 >>
sh: show: not found
";
        let results = parse_runner_results(stdout, &two_targets(), false);
        assert!(results[0].success);
        assert_eq!(results[0].return_code, Some(0));
        assert!(!results[1].success);
        assert_eq!(results[1].return_code, Some(127));
    }

    #[test]
    fn unmentioned_hosts_follow_overall_result() {
        let results = parse_runner_results("nothing useful", &two_targets(), true);
        assert!(results.iter().all(|r| r.success));
        let results = parse_runner_results("nothing useful", &two_targets(), false);
        assert!(results.iter().all(|r| !r.success));
    }

    #[test]
    fn extra_params_become_extra_vars_json() {
        let config = RunnerConfig::from_env();
        let params = json!({"vlan": 10});
        let args = build_args(
            &Operation::ad_hoc(["show vlan"]),
            std::path::Path::new("/tmp/inv.yml"),
            params.as_object().unwrap(),
            &config,
        )
        .unwrap();
        assert_eq!(args[..3], ["all", "-i", "/tmp/inv.yml"]);
        assert_eq!(args[args.len() - 2], "--extra-vars");
        assert_eq!(args[args.len() - 1], r#"{"vlan":10}"#);
    }

    #[tokio::test]
    async fn missing_playbook_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunnerConfig::from_env();
        config.playbook_dir = dir.path().to_path_buf();
        let capability = BackendCapability::Available {
            program: "ansible-playbook".into(),
            version: "test".into(),
        };

        let mut job = ExecutionJob::new("missing", 2);
        let outcome = run_runner_tier(
            &mut job,
            &capability,
            &Operation::named("missing"),
            &two_targets(),
            &Map::new(),
            &config,
            &CancelFlag::new(),
        )
        .await;

        assert!(matches!(outcome, RunnerOutcome::LaunchFailed(_)));
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.execution_mode(), None);
        assert!(!dir.path().join("missing.yml").exists());
    }

    #[tokio::test]
    async fn built_in_playbook_is_written_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunnerConfig::from_env();
        config.playbook_dir = dir.path().join("playbooks");
        config.playbook_program = "netauto-test-absent-playbook-runner".into();
        let capability = BackendCapability::Available {
            program: config.playbook_program.clone(),
            version: "test".into(),
        };

        let mut job = ExecutionJob::new("connectivity_test", 2);
        let outcome = run_runner_tier(
            &mut job,
            &capability,
            &Operation::named("connectivity_test"),
            &two_targets(),
            &Map::new(),
            &config,
            &CancelFlag::new(),
        )
        .await;

        // The file exists; only the spawn of the absent program failed.
        assert!(config.playbook_dir.join("connectivity_test.yml").is_file());
        match outcome {
            RunnerOutcome::LaunchFailed(reason) => {
                assert!(reason.contains("failed to launch"), "{reason}")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
