use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::alerts::{AlertStatus, AlertStore};
use crate::app::AppContext;
use crate::database::{AlertRecord, Database};
use crate::execution::{
    BackendCapability, ExecutionJob, ExecutionMode, Operation, Orchestrator, PlaybookInfo,
};
use crate::inventory::{BuildWarning, TargetSet, build_target_set, load_device_file};
use crate::security::{BatchSummary, ConfigAuditOutcome, SecurityAssessor, SecurityOverview};

/// Operation whose per-device output is a running configuration
const CONFIG_BACKUP_OPERATION: &str = "backup_config";

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub inventory_warnings: Vec<BuildWarning>,
    pub summary: BatchSummary,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub inventory_warnings: Vec<BuildWarning>,
    pub job: ExecutionJob,
    /// Findings from the configurations a backup run pulled
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_audit: Vec<ConfigAuditOutcome>,
}

#[derive(Debug, Serialize)]
pub struct CapabilityReport {
    pub playbook_runner: BackendCapability,
    pub adhoc_runner: BackendCapability,
    pub direct_protocol: &'static str,
}

fn open_database(context: &AppContext) -> Result<Database> {
    Database::new(context.db_path().to_path_buf()).with_context(|| {
        format!(
            "Failed to open database at {}",
            context.db_path().display()
        )
    })
}

fn load_targets(devices: &Path, target: Option<&str>) -> Result<(TargetSet, Vec<BuildWarning>)> {
    let records = load_device_file(devices)
        .with_context(|| format!("Failed to load device list {}", devices.display()))?;
    let build = build_target_set(&records);
    for warning in &build.warnings {
        crate::log_warn!("Inventory: {}", warning);
    }

    let targets = match target {
        Some(selector) => build.targets.select(selector),
        None => build.targets,
    };
    if targets.is_empty() {
        return Err(anyhow::anyhow!(
            "No devices selected from {}{}",
            devices.display(),
            target
                .map(|t| format!(" with target '{}'", t))
                .unwrap_or_default()
        ));
    }
    Ok((targets, build.warnings))
}

pub(crate) async fn scan_report(
    devices: &Path,
    target: Option<&str>,
    ports: Option<Vec<u16>>,
    context: &AppContext,
) -> Result<ScanReport> {
    let (targets, inventory_warnings) = load_targets(devices, target)?;
    let db = open_database(context)?;

    let mut config = context.scan_config().clone();
    if let Some(ports) = ports {
        config = config.with_ports(ports);
    }

    let assessor = assessor(config, db, context);
    let summary = assessor
        .scan_batch(targets.devices(), &context.cancel_flag())
        .await;

    Ok(ScanReport {
        inventory_warnings,
        summary,
    })
}

pub(crate) async fn run_report(
    operation: Option<&str>,
    devices: &Path,
    target: Option<&str>,
    commands: Vec<String>,
    extra_vars: &[(String, String)],
    context: &AppContext,
) -> Result<RunReport> {
    let (targets, inventory_warnings) = load_targets(devices, target)?;

    let operation = match operation {
        Some(name) => Operation::named(name),
        None => Operation::ad_hoc(commands),
    };
    let extra: Map<String, Value> = extra_vars
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let orchestrator = orchestrator(context);
    let job = orchestrator
        .run_operation(&operation, &targets, &extra, &context.cancel_flag())
        .await
        .context("Operation could not be started")?;

    let config_audit = audit_backed_up_configs(&job, &targets, context).await?;

    Ok(RunReport {
        inventory_warnings,
        job,
        config_audit,
    })
}

/// Run the configuration audit over what a real `backup_config` job pulled.
/// Simulated output is never audited.
async fn audit_backed_up_configs(
    job: &ExecutionJob,
    targets: &TargetSet,
    context: &AppContext,
) -> Result<Vec<ConfigAuditOutcome>> {
    if job.operation != CONFIG_BACKUP_OPERATION
        || matches!(job.execution_mode(), None | Some(ExecutionMode::Simulation))
    {
        return Ok(Vec::new());
    }

    let pulled: Vec<_> = job
        .device_results
        .iter()
        .filter(|r| r.success && !r.stdout.trim().is_empty())
        .filter_map(|r| {
            targets
                .iter()
                .find(|d| d.hostname == r.hostname)
                .map(|device| (device, r.stdout.as_str()))
        })
        .collect();
    if pulled.is_empty() {
        return Ok(Vec::new());
    }

    let assessor = assessor(context.scan_config().clone(), open_database(context)?, context);
    let mut outcomes = Vec::with_capacity(pulled.len());
    for (device, config_text) in pulled {
        outcomes.push(assessor.audit_config(device, config_text).await);
    }
    Ok(outcomes)
}

fn assessor(config: crate::config::ScanConfig, db: Database, context: &AppContext) -> SecurityAssessor {
    match context.authenticator() {
        Some(authenticator) => SecurityAssessor::new(config, db, authenticator),
        None => SecurityAssessor::with_ssh(config, db),
    }
}

fn orchestrator(context: &AppContext) -> Orchestrator {
    match context.executor() {
        Some(executor) => Orchestrator::new(
            context.runner_config().clone(),
            context.direct_config().clone(),
            executor,
        ),
        None => Orchestrator::with_ssh(
            context.runner_config().clone(),
            context.direct_config().clone(),
        ),
    }
}

pub(crate) fn list_alerts(
    status: Option<AlertStatus>,
    limit: usize,
    context: &AppContext,
) -> Result<Vec<AlertRecord>> {
    let store = AlertStore::new(open_database(context)?);
    Ok(store.list(status, limit)?)
}

pub(crate) fn acknowledge_alert(id: &str, context: &AppContext) -> Result<AlertRecord> {
    let store = AlertStore::new(open_database(context)?);
    Ok(store.acknowledge(id)?)
}

pub(crate) fn resolve_alert(id: &str, context: &AppContext) -> Result<AlertRecord> {
    let store = AlertStore::new(open_database(context)?);
    Ok(store.resolve(id)?)
}

pub(crate) fn security_overview(context: &AppContext) -> Result<SecurityOverview> {
    let store = AlertStore::new(open_database(context)?);
    Ok(crate::security::overview(&store)?)
}

pub(crate) async fn capability_report(context: &AppContext) -> CapabilityReport {
    let orchestrator = orchestrator(context);
    let named_op = Operation::named("connectivity_test");
    let adhoc_op = Operation::ad_hoc(["true"]);
    let (playbook_runner, adhoc_runner) = tokio::join!(
        orchestrator.detect(&named_op),
        orchestrator.detect(&adhoc_op),
    );
    CapabilityReport {
        playbook_runner,
        adhoc_runner,
        direct_protocol: "ssh",
    }
}

pub(crate) fn playbook_catalog(context: &AppContext) -> Result<Vec<PlaybookInfo>> {
    crate::execution::list_playbooks(&context.runner_config().playbook_dir)
}
