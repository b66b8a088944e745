//! Port → service classification and insecure-service rules

use crate::alerts::{Alert, AlertCategory, AlertSeverity};
use crate::models::ScanResult;

const SERVICE_TABLE: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (161, "snmp"),
    (443, "https"),
    (445, "smb"),
    (830, "netconf"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (8080, "http-alt"),
    (8443, "https-alt"),
];

/// Service label for an open port; unmapped ports become `port-<n>`.
pub fn service_name(port: u16) -> String {
    SERVICE_TABLE
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("port-{}", port))
}

struct ServiceRule {
    service: &'static str,
    severity: AlertSeverity,
    title: &'static str,
    recommendation: &'static str,
}

const SERVICE_RULES: &[ServiceRule] = &[
    ServiceRule {
        service: "telnet",
        severity: AlertSeverity::High,
        title: "Telnet service enabled",
        recommendation: "Telnet sends credentials in cleartext; disable it and use SSH",
    },
    ServiceRule {
        service: "ftp",
        severity: AlertSeverity::Medium,
        title: "FTP service enabled",
        recommendation: "FTP sends credentials in cleartext; use SFTP or SCP",
    },
    ServiceRule {
        service: "snmp",
        severity: AlertSeverity::Medium,
        title: "SNMP service reachable",
        recommendation: "Restrict SNMP to management hosts and use SNMPv3",
    },
    ServiceRule {
        service: "http",
        severity: AlertSeverity::Low,
        title: "Unencrypted HTTP management",
        recommendation: "Serve management interfaces over HTTPS only",
    },
    ServiceRule {
        service: "http-alt",
        severity: AlertSeverity::Low,
        title: "Unencrypted HTTP management",
        recommendation: "Serve management interfaces over HTTPS only",
    },
    ServiceRule {
        service: "rdp",
        severity: AlertSeverity::Medium,
        title: "Remote desktop exposed",
        recommendation: "Limit RDP to a VPN or jump host",
    },
    ServiceRule {
        service: "vnc",
        severity: AlertSeverity::Medium,
        title: "VNC exposed",
        recommendation: "Limit VNC to a VPN or jump host and require strong auth",
    },
];

/// `SSH-1.99` advertises v2 support as well, so only pure v1 counts.
fn is_legacy_ssh_banner(banner: &str) -> bool {
    banner.starts_with("SSH-1.") && !banner.starts_with("SSH-1.99")
}

/// Risk findings for one open port, attributed to `device`.
pub fn assess_open_port(device: &str, result: &ScanResult) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(rule) = SERVICE_RULES.iter().find(|r| r.service == result.service) {
        alerts.push(
            Alert::new(AlertCategory::InsecureService, rule.title)
                .with_device(device)
                .with_severity(rule.severity)
                .with_dedupe_kind(format!("{}-port-{}", rule.service, result.port))
                .with_description(format!(
                    "{} is listening on {}:{}. {}",
                    rule.service, result.host, result.port, rule.recommendation
                )),
        );
    }

    if let Some(banner) = result.banner.as_deref()
        && is_legacy_ssh_banner(banner)
    {
        alerts.push(
            Alert::new(AlertCategory::LegacyConfiguration, "SSH protocol version 1 offered")
                .with_device(device)
                .with_severity(AlertSeverity::High)
                .with_dedupe_kind(format!("sshv1-port-{}", result.port))
                .with_description(format!(
                    "Banner '{}' on {}:{} offers only SSHv1. Set 'ip ssh version 2'",
                    banner, result.host, result.port
                )),
        );
    }

    alerts
}
