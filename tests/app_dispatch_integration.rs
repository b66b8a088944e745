use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netauto_core::execution::{CommandOutput, RemoteError, RemoteExecutor};
use netauto_core::{
    AppCommand, AppCommandResult, AppContext, Device, DirectConfig, ExecutionMode, JobStatus,
    OutputHook, RunnerConfig, execute_command_typed, execute_command_with_context,
};

/// Answers every command with a weak running configuration.
struct WeakConfigExecutor;

impl RemoteExecutor for WeakConfigExecutor {
    fn execute<'a>(
        &'a self,
        _device: &'a Device,
        commands: &'a [String],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<CommandOutput>, RemoteError>> + Send + 'a>,
    > {
        Box::pin(async move {
            Ok(commands
                .iter()
                .map(|c| CommandOutput {
                    command: c.clone(),
                    stdout: "version 12.2\nno service password-encryption\nenable password cisco\n"
                        .to_string(),
                    stderr: String::new(),
                    exit_status: 0,
                })
                .collect())
        })
    }
}

fn make_test_context(dir: &Path) -> (AppContext, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let output_hook: OutputHook = Arc::new(move |line| {
        sink.lock()
            .expect("output lock should not be poisoned")
            .push(line.to_string());
    });

    let runner = RunnerConfig {
        playbook_program: "netauto-test-missing-playbook-runner".to_string(),
        adhoc_program: "netauto-test-missing-adhoc-runner".to_string(),
        playbook_dir: dir.join("playbooks"),
        check_timeout: Duration::from_secs(2),
        job_timeout: Duration::from_secs(5),
    };
    let direct = DirectConfig {
        device_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        concurrency: 2,
        reachability_timeout: Duration::from_millis(300),
    };

    let context = AppContext::from_env()
        .with_db_path(dir.join("netauto.db"))
        .with_runner_config(runner)
        .with_direct_config(direct)
        .with_output_hook(output_hook);
    (context, lines)
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn write_devices(dir: &Path) -> PathBuf {
    let path = dir.join("devices.json");
    let devices = serde_json::json!([
        {"hostname": "core-rtr", "ip": format!("127.0.0.1:{}", closed_port()), "role": "router"},
        {"name": "access-sw", "address": "127.0.0.1", "port": closed_port(), "type": "switch"},
        {"hostname": "broken"}
    ]);
    std::fs::write(&path, serde_json::to_string(&devices).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn help_command_writes_usage_to_output_hook() {
    let dir = tempfile::tempdir().unwrap();
    let (context, lines) = make_test_context(dir.path());

    execute_command_with_context(AppCommand::Help, &context)
        .await
        .expect("help command should succeed");

    let output = lines.lock().unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0].contains("Usage:"));
}

#[tokio::test]
async fn run_without_runner_or_reachable_devices_is_simulated() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _lines) = make_test_context(dir.path());
    let devices = write_devices(dir.path());

    let result = execute_command_typed(
        AppCommand::Run {
            operation: Some("connectivity_test".to_string()),
            devices,
            target: None,
            commands: Vec::new(),
            extra_vars: Vec::new(),
        },
        &context,
    )
    .await
    .expect("run should produce a job");

    let AppCommandResult::Run(report) = result else {
        panic!("expected a run result");
    };
    assert_eq!(report.inventory_warnings.len(), 1);
    assert_eq!(report.job.execution_mode(), Some(ExecutionMode::Simulation));
    assert_eq!(report.job.status(), JobStatus::Success);
    assert_eq!(report.job.devices_attempted, 2);
}

#[tokio::test]
async fn run_with_unmatched_target_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _lines) = make_test_context(dir.path());
    let devices = write_devices(dir.path());

    let err = execute_command_typed(
        AppCommand::Run {
            operation: Some("system_info".to_string()),
            devices,
            target: Some("firewalls".to_string()),
            commands: Vec::new(),
            extra_vars: Vec::new(),
        },
        &context,
    )
    .await
    .expect_err("no firewall in the device list");
    assert!(err.to_string().contains("No devices selected"));
}

#[tokio::test]
async fn alerts_on_fresh_database_emit_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (context, lines) = make_test_context(dir.path());

    execute_command_with_context(
        AppCommand::Alerts {
            status: None,
            limit: 10,
        },
        &context,
    )
    .await
    .expect("listing alerts should succeed");

    assert!(lines.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ack_of_unknown_alert_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _lines) = make_test_context(dir.path());

    let err = execute_command_typed(AppCommand::Ack { id: "nope".to_string() }, &context)
        .await
        .expect_err("unknown id");
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn overview_and_playbooks_emit_json() {
    let dir = tempfile::tempdir().unwrap();
    let (context, lines) = make_test_context(dir.path());
    std::fs::create_dir_all(dir.path().join("playbooks")).unwrap();
    std::fs::write(
        dir.path().join("playbooks").join("ntp.yml"),
        "- name: Configure NTP\n  hosts: all\n",
    )
    .unwrap();

    execute_command_with_context(AppCommand::Overview, &context)
        .await
        .unwrap();
    execute_command_with_context(AppCommand::Playbooks, &context)
        .await
        .unwrap();

    let output = lines.lock().unwrap();
    let overview: serde_json::Value = serde_json::from_str(&output[0]).unwrap();
    assert_eq!(overview["kind"], "overview");
    assert_eq!(overview["payload"]["security_score"], 100);

    let playbooks: serde_json::Value = serde_json::from_str(&output[1]).unwrap();
    let names: Vec<&str> = playbooks["payload"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.contains(&"ntp.yml"));
    assert!(names.contains(&"system_info.yml"));
}

#[tokio::test]
async fn backup_run_audits_the_pulled_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let (context, _lines) = make_test_context(dir.path());
    let context = context.with_executor(Arc::new(WeakConfigExecutor));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let devices = dir.path().join("devices.json");
    let records = serde_json::json!([
        {"hostname": "edge-1", "ip": "127.0.0.1", "port": port, "role": "cisco_ios"}
    ]);
    std::fs::write(&devices, serde_json::to_string(&records).unwrap()).unwrap();

    let run = AppCommand::Run {
        operation: Some("backup_config".to_string()),
        devices: devices.clone(),
        target: None,
        commands: Vec::new(),
        extra_vars: Vec::new(),
    };
    let AppCommandResult::Run(report) = execute_command_typed(run, &context).await.unwrap() else {
        panic!("expected a run result");
    };

    assert_eq!(report.job.execution_mode(), Some(ExecutionMode::DirectRemote));
    assert_eq!(report.config_audit.len(), 1);
    let audit = &report.config_audit[0];
    assert_eq!(audit.hostname, "edge-1");
    // enable password, password encryption, outdated 12.2 firmware
    assert_eq!(audit.alerts_created, 3);

    let AppCommandResult::Alerts(alerts) = execute_command_typed(
        AppCommand::Alerts {
            status: None,
            limit: 10,
        },
        &context,
    )
    .await
    .unwrap() else {
        panic!("expected an alert listing");
    };
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.device == format!("127.0.0.1:{}", port)));
    drop(listener);
}
