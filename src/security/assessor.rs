//! Scan Aggregator: port scan + credential probe per device, findings → alerts

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::config_audit::{assess_firmware, audit_device_config};
use super::score_findings;
use crate::alerts::{Alert, AlertCategory, AlertSeverity, AlertStore};
use crate::config::ScanConfig;
use crate::database::Database;
use crate::execution::CancelFlag;
use crate::models::{CredentialFinding, Device, ScanResult};
use crate::probe::{Authenticator, DEFAULT_CREDENTIALS, SshAuthenticator, probe_credentials_with};
use crate::scanner::{PortScanner, assess_open_port};

/// Per-device result of a batch
#[derive(Debug, Clone, Serialize)]
pub struct DeviceOutcome {
    pub hostname: String,
    pub host: String,
    pub management_port: u16,
    pub succeeded: bool,
    pub open_ports: Vec<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_finding: Option<CredentialFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_error: Option<String>,
    pub findings: usize,
    pub alerts_created: usize,
    pub alerts_deduplicated: usize,
    pub alerts_failed: usize,
    #[serde(skip)]
    finding_severities: Vec<AlertSeverity>,
}

impl DeviceOutcome {
    fn new(device: &Device) -> Self {
        Self {
            hostname: device.hostname.clone(),
            host: device.host.clone(),
            management_port: device.port,
            succeeded: false,
            open_ports: Vec::new(),
            credential_finding: None,
            probe_error: None,
            findings: 0,
            alerts_created: 0,
            alerts_deduplicated: 0,
            alerts_failed: 0,
            finding_severities: Vec::new(),
        }
    }
}

/// Result of auditing one device's configuration text
#[derive(Debug, Clone, Serialize)]
pub struct ConfigAuditOutcome {
    pub hostname: String,
    pub host: String,
    pub findings: Vec<String>,
    pub alerts_created: usize,
    pub alerts_deduplicated: usize,
    pub alerts_failed: usize,
}

#[derive(Debug, Default)]
struct RecordTally {
    created: usize,
    deduplicated: usize,
    failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub scan_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub devices_attempted: usize,
    pub devices_succeeded: usize,
    pub open_ports: usize,
    pub findings: usize,
    pub alerts_created: usize,
    pub alerts_deduplicated: usize,
    pub alerts_failed: usize,
    /// 0..=100, higher is better
    pub security_score: u8,
    pub cancelled: bool,
    pub devices: Vec<DeviceOutcome>,
}

/// Runs security scans over device batches and records alerts.
#[derive(Clone)]
pub struct SecurityAssessor {
    scanner: PortScanner,
    authenticator: Arc<dyn Authenticator>,
    store: AlertStore,
    config: ScanConfig,
}

impl SecurityAssessor {
    pub fn new(
        config: ScanConfig,
        db: Database,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            scanner: PortScanner::new(config.clone()).with_database(db.clone()),
            authenticator,
            store: AlertStore::new(db),
            config,
        }
    }

    /// Assessor probing credentials over SSH.
    pub fn with_ssh(config: ScanConfig, db: Database) -> Self {
        let authenticator = Arc::new(SshAuthenticator::new(config.credential_timeout));
        Self::new(config, db, authenticator)
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Scan every device: default ports plus its management port, then a
    /// credential probe when the management port is open.
    ///
    /// Devices run concurrently up to the configured limit. One device's
    /// failure never stops the others, and storage errors only show up in
    /// the `alerts_failed` tallies.
    pub async fn scan_batch(&self, devices: &[Device], cancel: &CancelFlag) -> BatchSummary {
        let scan_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        crate::log_stderr!("Security scan {} over {} devices", scan_id, devices.len());

        let semaphore = Arc::new(Semaphore::new(self.config.device_concurrency.max(1)));
        let mut slots: Vec<Option<DeviceOutcome>> = vec![None; devices.len()];
        let mut set = JoinSet::new();

        for (index, device) in devices.iter().enumerate() {
            let assessor = self.clone();
            let device = device.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if cancel.is_cancelled() {
                    let mut outcome = DeviceOutcome::new(&device);
                    outcome.probe_error = Some("cancelled".to_string());
                    return (index, outcome);
                }
                (index, assessor.scan_device(&device, &cancel).await)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => crate::log_warn!("Device scan task failed: {}", e),
            }
        }

        let outcomes: Vec<DeviceOutcome> = slots
            .into_iter()
            .zip(devices)
            .map(|(slot, device)| {
                slot.unwrap_or_else(|| {
                    let mut outcome = DeviceOutcome::new(device);
                    outcome.probe_error = Some("scan task aborted".to_string());
                    outcome
                })
            })
            .collect();

        let severities: Vec<AlertSeverity> = outcomes
            .iter()
            .flat_map(|o| o.finding_severities.iter().copied())
            .collect();

        let summary = BatchSummary {
            scan_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
            devices_attempted: outcomes.len(),
            devices_succeeded: outcomes.iter().filter(|o| o.succeeded).count(),
            open_ports: outcomes.iter().map(|o| o.open_ports.len()).sum(),
            findings: outcomes.iter().map(|o| o.findings).sum(),
            alerts_created: outcomes.iter().map(|o| o.alerts_created).sum(),
            alerts_deduplicated: outcomes.iter().map(|o| o.alerts_deduplicated).sum(),
            alerts_failed: outcomes.iter().map(|o| o.alerts_failed).sum(),
            security_score: score_findings(&severities),
            cancelled: cancel.is_cancelled(),
            devices: outcomes,
        };

        crate::log_stderr!(
            "Security scan {} complete: {}/{} devices, {} open ports, {} findings, score {}",
            summary.scan_id,
            summary.devices_succeeded,
            summary.devices_attempted,
            summary.open_ports,
            summary.findings,
            summary.security_score
        );
        summary
    }

    /// Audit a device's running configuration and record the findings.
    ///
    /// Storage errors are counted, never returned, the same as during a scan.
    pub async fn audit_config(&self, device: &Device, config_text: &str) -> ConfigAuditOutcome {
        let endpoint = device.endpoint();
        let alerts = audit_device_config(device, config_text);
        let tally = self.record(&endpoint, &alerts).await;
        crate::log_stderr!(
            "Config audit of {}: {} findings, {} new alerts",
            endpoint,
            alerts.len(),
            tally.created
        );
        ConfigAuditOutcome {
            hostname: device.hostname.clone(),
            host: device.host.clone(),
            findings: alerts.into_iter().map(|a| a.title).collect(),
            alerts_created: tally.created,
            alerts_deduplicated: tally.deduplicated,
            alerts_failed: tally.failed,
        }
    }

    async fn record(&self, endpoint: &str, alerts: &[Alert]) -> RecordTally {
        let mut tally = RecordTally::default();
        for alert in alerts {
            match self.store.create_async(alert.clone()).await {
                Ok(creation) if creation.created => tally.created += 1,
                Ok(_) => tally.deduplicated += 1,
                Err(e) => {
                    crate::log_warn!("Alert not recorded for {}: {}", endpoint, e);
                    tally.failed += 1;
                }
            }
        }
        tally
    }

    async fn scan_device(&self, device: &Device, cancel: &CancelFlag) -> DeviceOutcome {
        let mut outcome = DeviceOutcome::new(device);
        let endpoint = device.endpoint();

        let mut ports = self.config.ports.clone();
        ports.push(device.port);
        outcome.open_ports = self
            .scanner
            .scan_device_until(&device.host, Some(&ports), cancel)
            .await;

        let mut alerts: Vec<Alert> = outcome
            .open_ports
            .iter()
            .flat_map(|result| assess_open_port(&endpoint, result))
            .collect();

        let banners: Vec<&str> = outcome
            .open_ports
            .iter()
            .filter_map(|r| r.banner.as_deref())
            .collect();
        alerts.extend(assess_firmware(&endpoint, &banners.join("\n")));

        let management_open = outcome.open_ports.iter().any(|r| r.port == device.port);
        if cancel.is_cancelled() {
            outcome.probe_error = Some("cancelled".to_string());
        } else if management_open {
            match probe_credentials_with(
                self.authenticator.as_ref(),
                &device.host,
                device.port,
                DEFAULT_CREDENTIALS,
                self.config.credential_timeout,
            )
            .await
            {
                Ok(Some(finding)) => {
                    alerts.push(weak_credentials_alert(&endpoint, &finding));
                    outcome.credential_finding = Some(finding);
                }
                Ok(None) => {}
                Err(e) => {
                    crate::log_warn!("Credential probe of {} failed: {}", endpoint, e);
                    outcome.probe_error = Some(e.to_string());
                }
            }
        }

        outcome.findings = alerts.len();
        outcome.finding_severities = alerts.iter().map(|a| a.severity).collect();
        let tally = self.record(&endpoint, &alerts).await;
        outcome.alerts_created = tally.created;
        outcome.alerts_deduplicated = tally.deduplicated;
        outcome.alerts_failed = tally.failed;

        outcome.succeeded = outcome.probe_error.is_none();
        outcome
    }
}

fn weak_credentials_alert(endpoint: &str, finding: &CredentialFinding) -> Alert {
    Alert::new(AlertCategory::WeakCredentials, "Default credentials accepted")
        .with_device(endpoint)
        .with_description(format!(
            "{}:{} accepted the factory default login for user '{}'. Change the password",
            finding.host,
            finding.port,
            finding.credentials.username()
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use crate::probe::{AuthOutcome, ProbeError};
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Accepts exactly one username/password pair.
    struct AcceptOnly(&'static str, &'static str);

    impl Authenticator for AcceptOnly {
        fn protocol(&self) -> &'static str {
            "test"
        }

        fn attempt<'a>(
            &'a self,
            _host: &'a str,
            _port: u16,
            credentials: &'a Credentials,
        ) -> Pin<Box<dyn Future<Output = Result<AuthOutcome, ProbeError>> + Send + 'a>> {
            let accepted =
                credentials.username() == self.0 && credentials.password() == self.1;
            Box::pin(async move {
                Ok(if accepted {
                    AuthOutcome::Accepted
                } else {
                    AuthOutcome::Rejected
                })
            })
        }
    }

    struct Unreachable;

    impl Authenticator for Unreachable {
        fn protocol(&self) -> &'static str {
            "test"
        }

        fn attempt<'a>(
            &'a self,
            host: &'a str,
            port: u16,
            _credentials: &'a Credentials,
        ) -> Pin<Box<dyn Future<Output = Result<AuthOutcome, ProbeError>> + Send + 'a>> {
            Box::pin(async move { Err(ProbeError::transport(host, port, "reset")) })
        }
    }

    async fn listening_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                drop(sock);
            }
        });
        port
    }

    fn config() -> ScanConfig {
        ScanConfig::default()
            .with_ports(Vec::new())
            .with_timeout(Duration::from_millis(500))
            .with_banner_timeout(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn default_login_raises_one_critical_alert() {
        let port = listening_port().await;
        let db = Database::in_memory().unwrap();
        let assessor =
            SecurityAssessor::new(config(), db, Arc::new(AcceptOnly("admin", "password")));
        let devices = vec![Device::new("r1", "127.0.0.1").with_port(port)];

        let summary = assessor.scan_batch(&devices, &CancelFlag::new()).await;

        assert_eq!(summary.devices_attempted, 1);
        assert_eq!(summary.devices_succeeded, 1);
        assert_eq!(summary.open_ports, 1);
        assert_eq!(summary.alerts_created, 1);
        assert_eq!(summary.security_score, 75);
        let finding = summary.devices[0].credential_finding.as_ref().unwrap();
        assert_eq!(finding.credentials.username(), "admin");

        let counts = assessor.store().open_counts().unwrap();
        assert_eq!(counts.critical, 1);

        let again = assessor.scan_batch(&devices, &CancelFlag::new()).await;
        assert_eq!(again.alerts_created, 0);
        assert_eq!(again.alerts_deduplicated, 1);
        assert_eq!(assessor.store().open_counts().unwrap().total(), 1);
    }

    #[tokio::test]
    async fn probe_error_is_recorded_and_batch_continues() {
        let port = listening_port().await;
        let db = Database::in_memory().unwrap();
        let assessor = SecurityAssessor::new(config(), db, Arc::new(Unreachable));
        let devices = vec![
            Device::new("r1", "127.0.0.1").with_port(port),
            Device::new("r2", "127.0.0.1").with_port(port),
        ];

        let summary = assessor.scan_batch(&devices, &CancelFlag::new()).await;

        assert_eq!(summary.devices_attempted, 2);
        assert_eq!(summary.devices_succeeded, 0);
        assert!(summary.devices.iter().all(|d| d.probe_error.is_some()));
        assert_eq!(summary.alerts_created, 0);
        assert_eq!(summary.security_score, 100);
    }

    #[tokio::test]
    async fn cancelled_batch_still_accounts_for_every_device() {
        let db = Database::in_memory().unwrap();
        let assessor = SecurityAssessor::new(config(), db, Arc::new(Unreachable));
        let devices = vec![Device::new("r1", "127.0.0.1"), Device::new("r2", "127.0.0.1")];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let summary = assessor.scan_batch(&devices, &cancel).await;

        assert!(summary.cancelled);
        assert_eq!(summary.devices_attempted, 2);
        assert_eq!(summary.devices_succeeded, 0);
    }

    #[tokio::test]
    async fn outdated_firmware_banner_raises_an_alert() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock
                    .write_all(b"Cisco IOS Software, Version 12.2(55)SE7, RELEASE SOFTWARE\r\n")
                    .await;
            }
        });

        let db = Database::in_memory().unwrap();
        let assessor = SecurityAssessor::new(config(), db, Arc::new(AcceptOnly("x", "y")));
        let devices = vec![Device::new("r1", "127.0.0.1").with_port(port)];

        let summary = assessor.scan_batch(&devices, &CancelFlag::new()).await;

        assert_eq!(summary.findings, 1);
        assert_eq!(summary.alerts_created, 1);
        let stored = assessor.store().list(None, 10).unwrap();
        assert_eq!(stored[0].dedupe_kind, "firmware-outdated");
        assert_eq!(stored[0].severity, AlertSeverity::High);
    }

    #[tokio::test]
    async fn config_audit_records_and_deduplicates_findings() {
        let db = Database::in_memory().unwrap();
        let assessor = SecurityAssessor::new(config(), db, Arc::new(Unreachable));
        let device = Device::new("edge-1", "10.0.0.1").with_role("cisco_ios");
        let running = "version 15.2\nenable password cisco\nip http server\n";

        let first = assessor.audit_config(&device, running).await;
        assert_eq!(first.alerts_created, 2);
        assert_eq!(
            first.findings,
            vec!["Enable password in plaintext", "HTTP server enabled"]
        );

        let again = assessor.audit_config(&device, running).await;
        assert_eq!(again.alerts_created, 0);
        assert_eq!(again.alerts_deduplicated, 2);
        assert_eq!(assessor.store().open_counts().unwrap().high, 1);
    }

    #[tokio::test]
    async fn storage_failure_counts_as_failed_alert() {
        let port = listening_port().await;
        let db = Database::in_memory().unwrap();
        db.lock().unwrap().execute("DROP TABLE security_alerts", []).unwrap();
        let assessor =
            SecurityAssessor::new(config(), db, Arc::new(AcceptOnly("admin", "admin")));
        let devices = vec![Device::new("r1", "127.0.0.1").with_port(port)];

        let summary = assessor.scan_batch(&devices, &CancelFlag::new()).await;

        assert_eq!(summary.findings, 1);
        assert_eq!(summary.alerts_failed, 1);
        assert_eq!(summary.alerts_created, 0);
    }
}
