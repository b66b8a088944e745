use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cli::{usage_text, version_text};
use crate::command::AppCommand;
use crate::command_handlers::{
    CapabilityReport, RunReport, ScanReport, acknowledge_alert, capability_report, list_alerts,
    playbook_catalog, resolve_alert, run_report, scan_report, security_overview,
};
use crate::config::{DirectConfig, RunnerConfig, ScanConfig};
use crate::database::AlertRecord;
use crate::execution::{CancelFlag, PlaybookInfo, RemoteExecutor};
use crate::probe::Authenticator;
use crate::security::SecurityOverview;

pub type OutputHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything a command needs from its environment.
#[derive(Clone)]
pub struct AppContext {
    db_path: PathBuf,
    scan: ScanConfig,
    runner: RunnerConfig,
    direct: DirectConfig,
    authenticator: Option<Arc<dyn Authenticator>>,
    executor: Option<Arc<dyn RemoteExecutor>>,
    output_hook: OutputHook,
    cancel_flag: Arc<AtomicBool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AppCommandResult {
    HelpText(String),
    VersionText(String),
    Scan(ScanReport),
    Run(RunReport),
    Alerts(Vec<AlertRecord>),
    Alert(AlertRecord),
    Overview(SecurityOverview),
    Capabilities(CapabilityReport),
    Playbooks(Vec<PlaybookInfo>),
}

impl Default for AppContext {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AppContext {
    pub fn from_env() -> Self {
        Self {
            db_path: crate::database::Database::default_path(),
            scan: ScanConfig::from_env(),
            runner: RunnerConfig::from_env(),
            direct: DirectConfig::from_env(),
            authenticator: None,
            executor: None,
            output_hook: Arc::new(|line| println!("{}", line)),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = db_path;
        self
    }

    pub fn with_scan_config(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_runner_config(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_direct_config(mut self, direct: DirectConfig) -> Self {
        self.direct = direct;
        self
    }

    /// Replace the SSH login probe used by `scan`.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Replace the SSH executor used by the direct tier of `run`.
    pub fn with_executor(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_output_hook(mut self, output_hook: OutputHook) -> Self {
        self.output_hook = output_hook;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan
    }

    pub fn runner_config(&self) -> &RunnerConfig {
        &self.runner
    }

    pub fn direct_config(&self) -> &DirectConfig {
        &self.direct
    }

    pub(crate) fn authenticator(&self) -> Option<Arc<dyn Authenticator>> {
        self.authenticator.clone()
    }

    pub(crate) fn executor(&self) -> Option<Arc<dyn RemoteExecutor>> {
        self.executor.clone()
    }

    pub fn emit_line(&self, line: &str) {
        (self.output_hook)(line);
    }

    /// Flag shared with every job and scan started from this context.
    pub fn cancel_flag(&self) -> CancelFlag {
        CancelFlag::from_shared(Arc::clone(&self.cancel_flag))
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn reset_cancel(&self) {
        self.cancel_flag.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

/// Execute a pre-parsed command with the environment's context.
pub async fn execute_command(command: AppCommand) -> Result<()> {
    let context = AppContext::from_env();
    execute_command_with_context(command, &context).await
}

/// Execute a pre-parsed command and emit its result through the output hook.
pub async fn execute_command_with_context(command: AppCommand, context: &AppContext) -> Result<()> {
    let result = execute_command_typed(command, context).await?;
    emit_command_result(&result, context)
}

/// Execute a pre-parsed command and return a strongly-typed result payload.
pub async fn execute_command_typed(
    command: AppCommand,
    context: &AppContext,
) -> Result<AppCommandResult> {
    match command {
        AppCommand::Help => Ok(AppCommandResult::HelpText(usage_text())),
        AppCommand::Version => Ok(AppCommandResult::VersionText(version_text())),
        AppCommand::Scan {
            devices,
            target,
            ports,
        } => Ok(AppCommandResult::Scan(
            scan_report(&devices, target.as_deref(), ports, context).await?,
        )),
        AppCommand::Run {
            operation,
            devices,
            target,
            commands,
            extra_vars,
        } => Ok(AppCommandResult::Run(
            run_report(
                operation.as_deref(),
                &devices,
                target.as_deref(),
                commands,
                &extra_vars,
                context,
            )
            .await?,
        )),
        AppCommand::Alerts { status, limit } => {
            Ok(AppCommandResult::Alerts(list_alerts(status, limit, context)?))
        }
        AppCommand::Ack { id } => Ok(AppCommandResult::Alert(acknowledge_alert(&id, context)?)),
        AppCommand::Resolve { id } => Ok(AppCommandResult::Alert(resolve_alert(&id, context)?)),
        AppCommand::Overview => Ok(AppCommandResult::Overview(security_overview(context)?)),
        AppCommand::Capabilities => {
            Ok(AppCommandResult::Capabilities(capability_report(context).await))
        }
        AppCommand::Playbooks => Ok(AppCommandResult::Playbooks(playbook_catalog(context)?)),
    }
}

fn emit_command_result(result: &AppCommandResult, context: &AppContext) -> Result<()> {
    match result {
        AppCommandResult::HelpText(text) | AppCommandResult::VersionText(text) => {
            context.emit_line(text);
        }
        AppCommandResult::Alerts(alerts) => {
            // One JSON object per line
            for alert in alerts {
                let line = serde_json::to_string(alert).context("Failed to serialize alert")?;
                context.emit_line(&line);
            }
        }
        other => {
            let output = serde_json::to_string_pretty(other)
                .context("Failed to serialize command result")?;
            context.emit_line(&output);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn execute_command_typed_help_returns_help_variant() {
        let context = AppContext::from_env();
        let result = execute_command_typed(AppCommand::Help, &context)
            .await
            .expect("typed command execution should succeed");

        assert!(matches!(result, AppCommandResult::HelpText(text) if text.contains("Usage:")));
    }

    #[tokio::test]
    async fn output_hook_receives_version_line() {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let context = AppContext::from_env().with_output_hook(Arc::new(move |line| {
            sink.lock()
                .expect("output lock should not be poisoned")
                .push(line.to_string());
        }));

        execute_command_with_context(AppCommand::Version, &context)
            .await
            .expect("version should emit");

        let captured = lines.lock().expect("output lock should not be poisoned");
        assert_eq!(captured.len(), 1);
        assert!(captured[0].starts_with("netauto-core "));
    }

    #[test]
    fn context_cancel_flag_is_shared_with_jobs() {
        let context = AppContext::from_env();
        let flag = context.cancel_flag();
        assert!(!flag.is_cancelled());
        context.cancel();
        assert!(flag.is_cancelled());
        assert!(context.is_cancelled());
        context.reset_cancel();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn result_serializes_with_kind_and_payload() {
        let json = serde_json::to_value(AppCommandResult::VersionText("v".into())).unwrap();
        assert_eq!(json["kind"], "version_text");
        assert_eq!(json["payload"], "v");
    }
}
