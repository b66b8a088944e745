//! Security posture: batch assessment and the dashboard overview

mod assessor;
pub mod config_audit;

pub use assessor::{BatchSummary, ConfigAuditOutcome, DeviceOutcome, SecurityAssessor};
pub use config_audit::{assess_config, assess_firmware, audit_device_config};

use serde::Serialize;

use crate::alerts::{AlertError, AlertSeverity, AlertStatus, AlertStore};
use crate::database::{AlertRecord, SeverityCounts, queries};

const RECENT_ALERT_LIMIT: usize = 5;

/// 100 minus the severity weight of every finding, floored at 0.
pub fn score_findings(severities: &[AlertSeverity]) -> u8 {
    let penalty: u32 = severities.iter().map(|s| s.score_weight()).sum();
    100u32.saturating_sub(penalty) as u8
}

/// Score over stored alert counts.
pub fn security_score(counts: &SeverityCounts) -> u8 {
    let penalty: u32 = AlertSeverity::ALL
        .iter()
        .map(|s| s.score_weight().saturating_mul(counts.get(*s)))
        .fold(0u32, u32::saturating_add);
    100u32.saturating_sub(penalty) as u8
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityOverview {
    pub open_alerts: SeverityCounts,
    pub total_open_alerts: u32,
    /// Unresolved alerts, open plus acknowledged
    pub unresolved_alerts: u32,
    pub open_endpoints: u32,
    pub scanned_devices: u32,
    pub security_score: u8,
    pub recent_alerts: Vec<AlertRecord>,
}

/// Dashboard numbers from what is currently stored.
///
/// Acknowledged alerts still count against the score; only resolving an
/// alert lifts the penalty.
pub fn overview(store: &AlertStore) -> Result<SecurityOverview, AlertError> {
    let open = store.open_counts()?;
    let unresolved = store.unresolved_counts()?;
    let recent_alerts = store.list(Some(AlertStatus::Open), RECENT_ALERT_LIMIT)?;

    let (open_endpoints, scanned_devices) = {
        let conn = store.database().lock()?;
        (
            queries::count_open_endpoints(&conn)?,
            queries::count_scanned_hosts(&conn)?,
        )
    };

    Ok(SecurityOverview {
        total_open_alerts: open.total(),
        unresolved_alerts: unresolved.total(),
        security_score: security_score(&unresolved),
        open_alerts: open,
        open_endpoints,
        scanned_devices,
        recent_alerts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Alert, AlertCategory};
    use crate::database::Database;
    use crate::models::ScanResult;

    #[test]
    fn score_is_clamped_at_zero() {
        assert_eq!(score_findings(&[]), 100);
        assert_eq!(score_findings(&[AlertSeverity::Critical, AlertSeverity::Low]), 72);
        assert_eq!(score_findings(&[AlertSeverity::Critical; 5]), 0);
        assert_eq!(score_findings(&[AlertSeverity::Info; 10]), 100);
    }

    #[test]
    fn stored_score_matches_finding_score() {
        let mut counts = SeverityCounts::default();
        counts.add(AlertSeverity::High, 2);
        counts.add(AlertSeverity::Medium, 1);
        assert_eq!(
            security_score(&counts),
            score_findings(&[AlertSeverity::High, AlertSeverity::High, AlertSeverity::Medium])
        );
    }

    #[test]
    fn overview_counts_open_state() {
        let store = AlertStore::new(Database::in_memory().unwrap());
        {
            let conn = store.database().lock().unwrap();
            queries::insert_scan_result(&conn, &ScanResult::open("10.0.0.1", 23, "telnet"))
                .unwrap();
            queries::insert_scan_result(&conn, &ScanResult::open("10.0.0.1", 80, "http"))
                .unwrap();
        }

        let telnet = Alert::new(AlertCategory::InsecureService, "Telnet exposed")
            .with_device("10.0.0.1:22")
            .with_dedupe_kind("telnet-port-23");
        let http = Alert::new(AlertCategory::InsecureService, "HTTP exposed")
            .with_device("10.0.0.1:22")
            .with_severity(AlertSeverity::Low)
            .with_dedupe_kind("http-port-80");
        let telnet_id = store.create(&telnet.with_severity(AlertSeverity::High)).unwrap().id;
        store.create(&http).unwrap();
        store.acknowledge(&telnet_id).unwrap();

        let view = overview(&store).unwrap();
        assert_eq!(view.total_open_alerts, 1);
        assert_eq!(view.unresolved_alerts, 2);
        assert_eq!(view.open_endpoints, 2);
        assert_eq!(view.scanned_devices, 1);
        assert_eq!(view.security_score, 100 - 15 - 3);
        assert_eq!(view.recent_alerts.len(), 1);
    }
}
