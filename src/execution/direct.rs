//! Direct tier: per-device remote command execution without the runner

use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::catalog::render_command;
use super::job::{CancelFlag, DeviceResult, ExecutionJob, ExecutionMode, JobStatus};
use crate::config::DirectConfig;
use crate::inventory::TargetSet;
use crate::models::Device;

/// Output of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("command '{command}' failed: {reason}")]
    Command { command: String, reason: String },
}

/// Runs a command set on one device over its management protocol.
pub trait RemoteExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        device: &'a Device,
        commands: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CommandOutput>, RemoteError>> + Send + 'a>>;
}

/// TCP connect to the device's management port within `timeout`.
pub async fn check_reachable(device: &Device, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((device.host.as_str(), device.port)))
            .await,
        Ok(Ok(_))
    )
}

/// Reachability of every target, in target order, checked concurrently.
pub async fn probe_reachability(targets: &TargetSet, timeout: Duration) -> Vec<bool> {
    let mut set = JoinSet::new();
    for (index, device) in targets.iter().enumerate() {
        let device = device.clone();
        set.spawn(async move { (index, check_reachable(&device, timeout).await) });
    }

    let mut reachable = vec![false; targets.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, ok)) => reachable[index] = ok,
            Err(e) => crate::log_warn!("Reachability task failed: {}", e),
        }
    }
    reachable
}

/// Run `commands` on every reachable target.
///
/// Each device is an isolated work unit with its own timeout; unreachable
/// devices are recorded as failures without being contacted. The job
/// succeeds when at least one device does.
#[allow(clippy::too_many_arguments)]
pub async fn run_direct_tier(
    job: &mut ExecutionJob,
    targets: &TargetSet,
    reachable: &[bool],
    commands: &[String],
    extra_params: &Map<String, Value>,
    executor: Arc<dyn RemoteExecutor>,
    config: &DirectConfig,
    cancel: &CancelFlag,
) -> JobStatus {
    if let Err(e) = job.start(ExecutionMode::DirectRemote) {
        crate::log_error!("Job {} could not start direct tier: {}", job.job_id, e);
        return job.status();
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let commands = Arc::new(commands.to_vec());
    let params = Arc::new(extra_params.clone());
    let mut slots: Vec<Option<DeviceResult>> = vec![None; targets.len()];
    let mut set = JoinSet::new();

    for (index, device) in targets.iter().enumerate() {
        if !reachable.get(index).copied().unwrap_or(false) {
            slots[index] = Some(DeviceResult::failure(
                &device.hostname,
                &device.host,
                format!("management port {} unreachable", device.endpoint()),
            ));
            continue;
        }
        if commands.is_empty() {
            slots[index] = Some(DeviceResult::failure(
                &device.hostname,
                &device.host,
                format!("operation '{}' has no direct command set", job.operation),
            ));
            continue;
        }

        let device = device.clone();
        let semaphore = Arc::clone(&semaphore);
        let commands = Arc::clone(&commands);
        let params = Arc::clone(&params);
        let executor = Arc::clone(&executor);
        let cancel = cancel.clone();
        let device_timeout = config.device_timeout;

        set.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return (
                        index,
                        DeviceResult::failure(&device.hostname, &device.host, e.to_string()),
                    );
                }
            };
            if cancel.is_cancelled() {
                return (
                    index,
                    DeviceResult::failure(&device.hostname, &device.host, "cancelled"),
                );
            }
            let rendered: Vec<String> = commands
                .iter()
                .map(|c| render_command(c, &device.hostname, &params))
                .collect();
            let result = execute_device(&*executor, &device, &rendered, device_timeout).await;
            (index, result)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => crate::log_warn!("Direct execution task failed: {}", e),
        }
    }

    job.device_results = slots
        .into_iter()
        .zip(targets.iter())
        .map(|(slot, device)| {
            slot.unwrap_or_else(|| {
                DeviceResult::failure(&device.hostname, &device.host, "execution task aborted")
            })
        })
        .collect();

    let succeeded = job.device_results.iter().filter(|r| r.success).count();
    let total = job.device_results.len();

    let (status, message) = if cancel.is_cancelled() {
        (
            JobStatus::Error,
            format!("Job cancelled ({} of {} devices completed)", succeeded, total),
        )
    } else if succeeded > 0 {
        (
            JobStatus::Success,
            format!("{} of {} devices succeeded via direct remote execution", succeeded, total),
        )
    } else {
        (
            JobStatus::Failed,
            format!("All {} devices failed via direct remote execution", total),
        )
    };

    if let Err(e) = job.finish(status, message) {
        crate::log_error!("Job {} could not finish: {}", job.job_id, e);
    }
    status
}

async fn execute_device(
    executor: &dyn RemoteExecutor,
    device: &Device,
    commands: &[String],
    timeout: Duration,
) -> DeviceResult {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, executor.execute(device, commands)).await;

    let mut result = match outcome {
        Ok(Ok(outputs)) => {
            let mut result = DeviceResult::success(&device.hostname, &device.host);
            let failed = outputs.iter().find(|o| o.exit_status != 0);
            result.success = failed.is_none();
            result.return_code = Some(failed.map(|o| o.exit_status).unwrap_or(0));
            if let Some(failed) = failed {
                result.error = Some(format!(
                    "'{}' exited with {}",
                    failed.command, failed.exit_status
                ));
            }
            result.stdout = outputs
                .iter()
                .map(|o| format!("$ {}\n{}", o.command, o.stdout.trim_end()))
                .collect::<Vec<_>>()
                .join("\n");
            result.stderr = outputs
                .iter()
                .map(|o| o.stderr.trim_end())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            result
        }
        Ok(Err(e)) => DeviceResult::failure(&device.hostname, &device.host, e.to_string()),
        Err(_) => DeviceResult::failure(
            &device.hostname,
            &device.host,
            format!("device timed out after {:?}", timeout),
        ),
    };

    result.duration_ms = started.elapsed().as_millis() as u64;
    if !result.success {
        crate::log_warn!(
            "{} ({}) failed: {}",
            device.hostname,
            device.endpoint(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::build_target_set;
    use serde_json::json;

    struct Echo;

    impl RemoteExecutor for Echo {
        fn execute<'a>(
            &'a self,
            device: &'a Device,
            commands: &'a [String],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<CommandOutput>, RemoteError>> + Send + 'a>>
        {
            Box::pin(async move {
                if device.hostname == "bad-auth" {
                    return Err(RemoteError::Auth("rejected".into()));
                }
                Ok(commands
                    .iter()
                    .map(|c| CommandOutput {
                        command: c.clone(),
                        stdout: format!("{} ran {}", device.hostname, c),
                        stderr: String::new(),
                        exit_status: if c.starts_with("fail") { 1 } else { 0 },
                    })
                    .collect())
            })
        }
    }

    fn targets(names: &[&str]) -> TargetSet {
        let records: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| json!({"hostname": n, "host": format!("10.0.0.{}", i + 1)}))
            .collect();
        build_target_set(&records).targets
    }

    fn config() -> DirectConfig {
        DirectConfig {
            device_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            concurrency: 2,
            reachability_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_device() {
        let targets = targets(&["r1", "bad-auth", "r3"]);
        let mut job = ExecutionJob::new("system_info", targets.len());
        let params = json!({"iface": "ge-0/0/0"});

        let status = run_direct_tier(
            &mut job,
            &targets,
            &[true, true, false],
            &["show interface {{ iface }}".to_string()],
            params.as_object().unwrap(),
            Arc::new(Echo),
            &config(),
            &CancelFlag::new(),
        )
        .await;

        assert_eq!(status, JobStatus::Success);
        assert_eq!(job.execution_mode(), Some(ExecutionMode::DirectRemote));
        assert_eq!(job.devices_attempted, 3);
        assert_eq!(job.devices_successful, 1);
        assert!(job.is_partial());
        assert!(job.device_results[0].stdout.contains("show interface ge-0/0/0"));
        assert!(job.device_results[1].error.as_deref().unwrap().contains("authentication"));
        assert!(job.device_results[2].error.as_deref().unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn non_zero_exit_fails_the_device() {
        let targets = targets(&["r1"]);
        let mut job = ExecutionJob::new("adhoc", 1);

        let status = run_direct_tier(
            &mut job,
            &targets,
            &[true],
            &["show clock".to_string(), "fail now".to_string()],
            &Map::new(),
            Arc::new(Echo),
            &config(),
            &CancelFlag::new(),
        )
        .await;

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(job.device_results[0].return_code, Some(1));
    }

    #[tokio::test]
    async fn cancelled_job_ends_in_error() {
        let targets = targets(&["r1", "r2"]);
        let mut job = ExecutionJob::new("system_info", 2);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let status = run_direct_tier(
            &mut job,
            &targets,
            &[true, true],
            &["uptime".to_string()],
            &Map::new(),
            Arc::new(Echo),
            &config(),
            &cancel,
        )
        .await;

        assert_eq!(status, JobStatus::Error);
        assert!(job.message.contains("cancelled"));
        assert_eq!(job.devices_successful, 0);
    }

    #[tokio::test]
    async fn reachability_reflects_listening_ports() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let targets = build_target_set(&[
            json!({"hostname": "up", "host": format!("127.0.0.1:{}", open)}),
            json!({"hostname": "down", "host": format!("127.0.0.1:{}", closed)}),
        ])
        .targets;

        let reachable = probe_reachability(&targets, Duration::from_millis(500)).await;
        assert_eq!(reachable, vec![true, false]);
    }
}
