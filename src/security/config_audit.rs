//! Configuration and firmware audit
//!
//! Pure rule tables over device text: a running configuration pulled by the
//! `backup_config` operation, or a banner captured during a port scan.
//! Findings come back as [`Alert`]s ready for the store.

use crate::alerts::{Alert, AlertCategory, AlertSeverity};
use crate::inventory::network_os;
use crate::models::Device;

struct ConfigRule {
    /// Configuration line prefix, lowercase and single-spaced
    pattern: &'static str,
    dedupe_kind: &'static str,
    severity: AlertSeverity,
    title: &'static str,
    recommendation: &'static str,
}

const CONFIG_RULES: &[ConfigRule] = &[
    ConfigRule {
        pattern: "enable password",
        dedupe_kind: "config-enable-password",
        severity: AlertSeverity::High,
        title: "Enable password in plaintext",
        recommendation: "Use 'enable secret' instead of 'enable password'",
    },
    ConfigRule {
        pattern: "no service password-encryption",
        dedupe_kind: "config-password-encryption",
        severity: AlertSeverity::Medium,
        title: "Password encryption disabled",
        recommendation: "Enable service password-encryption",
    },
    ConfigRule {
        pattern: "ip http server",
        dedupe_kind: "config-http-server",
        severity: AlertSeverity::Medium,
        title: "HTTP server enabled",
        recommendation: "Disable the HTTP server or use 'ip http secure-server'",
    },
];

/// Release prefixes with known vulnerabilities. `12.4(1)` matches
/// `12.4(1)T` but not `12.4(15)`.
const VULNERABLE_FIRMWARE: &[&str] = &["12.2", "12.3", "12.4(1)", "15.0(1)SE"];

/// Network OS families whose configuration syntax the rules understand
const CONFIG_AUDIT_OS: &[&str] = &["ios", "iosxr", "nxos", "asa"];

pub const FIRMWARE_DEDUPE_KIND: &str = "firmware-outdated";

/// Lowercase with runs of whitespace collapsed to one space.
fn normalize_line(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn line_matches(line: &str, pattern: &str) -> bool {
    line == pattern
        || line
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.starts_with(' '))
}

/// Whether the device's configuration dialect is one the rules cover.
pub fn supports_config_audit(device: &Device) -> bool {
    let os = network_os(&device.role_label, device.vendor.as_deref());
    CONFIG_AUDIT_OS.contains(&os)
}

/// Check a running configuration against the weak-configuration rules.
///
/// Each rule fires at most once per configuration. Negated lines
/// (`no ip http server`) never match a positive rule.
pub fn assess_config(device: &Device, config_text: &str) -> Vec<Alert> {
    if !supports_config_audit(device) {
        crate::log_debug!(
            "Skipping config audit for {}: unsupported dialect",
            device.endpoint()
        );
        return Vec::new();
    }

    let lines: Vec<(usize, String)> = config_text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, normalize_line(line)))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('!'))
        .collect();

    CONFIG_RULES
        .iter()
        .filter_map(|rule| {
            let (line_no, _) = lines.iter().find(|(_, l)| line_matches(l, rule.pattern))?;
            Some(
                Alert::new(AlertCategory::LegacyConfiguration, rule.title)
                    .with_device(device.endpoint())
                    .with_severity(rule.severity)
                    .with_dedupe_kind(rule.dedupe_kind)
                    .with_description(format!(
                        "'{}' found on line {} of the running configuration. {}",
                        rule.pattern, line_no, rule.recommendation
                    )),
            )
        })
        .collect()
}

/// Version strings following the word `version`, e.g. `12.2(55)SE7` from
/// `Cisco IOS Software, ... Version 12.2(55)SE7, RELEASE SOFTWARE`.
fn version_strings(text: &str) -> Vec<&str> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .windows(2)
        .filter(|pair| pair[0].trim_end_matches(':').eq_ignore_ascii_case("version"))
        .map(|pair| pair[1].trim_end_matches([',', ';']))
        .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()))
        .collect()
}

fn is_vulnerable_release(version: &str) -> Option<&'static str> {
    VULNERABLE_FIRMWARE.iter().copied().find(|prefix| {
        version.strip_prefix(*prefix).is_some_and(|rest| {
            !rest.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        })
    })
}

/// Flag the first vulnerable firmware release mentioned in `text`.
pub fn assess_firmware(endpoint: &str, text: &str) -> Option<Alert> {
    let (version, prefix) = version_strings(text)
        .into_iter()
        .find_map(|v| is_vulnerable_release(v).map(|prefix| (v, prefix)))?;

    Some(
        Alert::new(AlertCategory::LegacyConfiguration, "Outdated firmware version")
            .with_device(endpoint)
            .with_severity(AlertSeverity::High)
            .with_dedupe_kind(FIRMWARE_DEDUPE_KIND)
            .with_description(format!(
                "Firmware {} belongs to the vulnerable {} release train. \
                 Upgrade to the latest stable firmware version",
                version, prefix
            )),
    )
}

/// Configuration rules plus the firmware check on the config's `version` line.
pub fn audit_device_config(device: &Device, config_text: &str) -> Vec<Alert> {
    let mut alerts = assess_config(device, config_text);
    alerts.extend(assess_firmware(&device.endpoint(), config_text));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEAK_CONFIG: &str = "\
Building configuration...
!
version 12.2
service timestamps debug uptime
no service password-encryption
!
hostname edge-1
enable password  cisco123
!
ip http server
ip http secure-server
end
";

    fn cisco() -> Device {
        Device::new("edge-1", "10.0.0.1").with_role("cisco_ios")
    }

    #[test]
    fn weak_config_lines_each_raise_one_alert() {
        let alerts = assess_config(&cisco(), WEAK_CONFIG);
        let kinds: Vec<_> = alerts.iter().map(|a| a.dedupe_kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["config-enable-password", "config-password-encryption", "config-http-server"]
        );
        assert!(alerts.iter().all(|a| a.category == AlertCategory::LegacyConfiguration));
        assert!(alerts.iter().all(|a| a.device == "10.0.0.1:22"));
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert_eq!(alerts[1].severity, AlertSeverity::Medium);
        assert!(alerts[0].description.contains("line 8"));
    }

    #[test]
    fn hardened_config_is_clean() {
        let hardened = "\
service password-encryption
enable secret 5 $1$abcd$xyz
no ip http server
ip http secure-server
";
        assert!(assess_config(&cisco(), hardened).is_empty());
    }

    #[test]
    fn other_dialects_are_not_audited() {
        let junos = Device::new("mx1", "10.0.0.2").with_role("juniper");
        assert!(assess_config(&junos, WEAK_CONFIG).is_empty());
    }

    #[test]
    fn firmware_trains_match_on_release_boundaries() {
        assert_eq!(is_vulnerable_release("12.2(55)SE7"), Some("12.2"));
        assert_eq!(is_vulnerable_release("12.4(1)T"), Some("12.4(1)"));
        assert_eq!(is_vulnerable_release("15.0(1)SE3"), Some("15.0(1)SE"));
        assert_eq!(is_vulnerable_release("12.4(15)T"), None);
        assert_eq!(is_vulnerable_release("12.25"), None);
        assert_eq!(is_vulnerable_release("15.2(7)E"), None);
    }

    #[test]
    fn firmware_read_from_show_version_banner() {
        let banner = "Cisco IOS Software, C2960 Software (C2960-LANBASEK9-M), \
                      Version 12.2(55)SE7, RELEASE SOFTWARE (fc1)";
        let alert = assess_firmware("10.0.0.1:23", banner).expect("12.2 is outdated");
        assert_eq!(alert.title, "Outdated firmware version");
        assert_eq!(alert.severity, AlertSeverity::High);
        assert_eq!(alert.dedupe_kind, FIRMWARE_DEDUPE_KIND);
        assert!(alert.description.contains("12.2(55)SE7"));

        assert!(assess_firmware("h:22", "SSH-2.0-Cisco-1.25").is_none());
        assert!(assess_firmware("h:22", "Version 15.2(7)E2").is_none());
    }

    #[test]
    fn device_audit_includes_config_version_line() {
        let alerts = audit_device_config(&cisco(), WEAK_CONFIG);
        assert_eq!(alerts.len(), 4);
        assert!(alerts.iter().any(|a| a.dedupe_kind == FIRMWARE_DEDUPE_KIND));
    }
}
