//! Database query functions

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use sha2::{Digest, Sha256};

use super::models::{AlertCreation, AlertRecord, SeverityCounts, StatusUpdate};
use crate::alerts::{Alert, AlertCategory, AlertSeverity, AlertStatus};
use crate::models::{PortStatus, ScanResult};

/// Hex characters kept from the SHA-256 digest
const ALERT_ID_LEN: usize = 32;

const ALERT_COLUMNS: &str = "id, severity, category, title, description, device, dedupe_kind, \
     generation, status, created_at, updated_at, superseded_by";

/// `ORDER BY` key ranking stored severities the same way [`AlertSeverity::rank`] does.
fn severity_order_sql() -> String {
    let arms: String = AlertSeverity::ALL
        .iter()
        .map(|s| format!(" WHEN '{}' THEN {}", s.as_str(), s.rank()))
        .collect();
    format!("CASE severity{arms} ELSE {} END", AlertSeverity::ALL.len())
}

/// Deterministic alert id for one generation of a finding.
///
/// The same `(device, category, dedupe_kind, generation)` always yields the
/// same id, so re-detection maps back onto the stored row.
pub fn derive_alert_id(
    device: &str,
    category: AlertCategory,
    dedupe_kind: &str,
    generation: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device.as_bytes());
    hasher.update([0x1f]);
    hasher.update(category.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(dedupe_kind.as_bytes());
    hasher.update([0x1f]);
    hasher.update(generation.to_string().as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ALERT_ID_LEN);
    id
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert an alert unless an open or acknowledged alert already covers the
/// same `(device, category, dedupe_kind)`.
///
/// The lookup and the insert share one immediate transaction, so callers
/// serialized on the connection lock can never produce two active rows for
/// the same key. A finding re-detected after resolution starts the next
/// generation and the resolved row is pointed at it through `superseded_by`.
pub fn insert_alert_deduped(conn: &mut Connection, alert: &Alert) -> Result<AlertCreation> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin alert transaction")?;

    let latest: Option<(String, i64, String)> = tx
        .query_row(
            r#"
            SELECT id, generation, status
            FROM security_alerts
            WHERE device = ?1 AND category = ?2 AND dedupe_kind = ?3
            ORDER BY generation DESC
            LIMIT 1
            "#,
            params![alert.device, alert.category.as_str(), alert.dedupe_kind],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .context("Failed to look up existing alert")?;

    let generation = match &latest {
        Some((id, generation, status)) => {
            if parse_alert_status_or_default(status).is_active() {
                tx.commit().context("Failed to close alert transaction")?;
                return Ok(AlertCreation {
                    id: id.clone(),
                    created: false,
                    generation: *generation,
                });
            }
            generation + 1
        }
        None => 0,
    };

    let id = derive_alert_id(&alert.device, alert.category, &alert.dedupe_kind, generation);
    let now = now_text();

    tx.execute(
        r#"
        INSERT INTO security_alerts
            (id, severity, category, title, description, device, dedupe_kind,
             generation, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
        params![
            id,
            alert.severity.as_str(),
            alert.category.as_str(),
            alert.title,
            alert.description,
            alert.device,
            alert.dedupe_kind,
            generation,
            AlertStatus::Open.as_str(),
            now,
        ],
    )
    .context("Failed to insert alert")?;

    if let Some((previous_id, _, _)) = &latest {
        tx.execute(
            "UPDATE security_alerts SET superseded_by = ?1 WHERE id = ?2",
            params![id, previous_id],
        )
        .context("Failed to link superseded alert")?;
    }

    tx.commit().context("Failed to commit alert")?;

    Ok(AlertCreation {
        id,
        created: true,
        generation,
    })
}

/// List alerts ordered critical → info, newest first within a severity.
pub fn list_alerts(
    conn: &Connection,
    status: Option<AlertStatus>,
    limit: usize,
) -> Result<Vec<AlertRecord>> {
    let severity_order = severity_order_sql();
    let sql = format!(
        r#"
        SELECT {ALERT_COLUMNS}
        FROM security_alerts
        WHERE (?1 IS NULL OR status = ?1)
        ORDER BY {severity_order}, created_at DESC, rowid DESC
        LIMIT ?2
        "#
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare alert listing")?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let alerts = stmt
        .query_map(params![status.map(|s| s.as_str()), limit], alert_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read alerts")?;

    Ok(alerts)
}

pub fn get_alert(conn: &Connection, id: &str) -> Result<Option<AlertRecord>> {
    let sql = format!("SELECT {ALERT_COLUMNS} FROM security_alerts WHERE id = ?1");
    conn.query_row(&sql, params![id], alert_from_row)
        .optional()
        .context("Failed to load alert")
}

/// Move an alert to `next`, enforcing the lifecycle.
pub fn update_alert_status(
    conn: &mut Connection,
    id: &str,
    next: AlertStatus,
) -> Result<StatusUpdate> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin status transaction")?;

    let current: Option<String> = tx
        .query_row(
            "SELECT status FROM security_alerts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to look up alert status")?;

    let Some(current) = current else {
        return Ok(StatusUpdate::NotFound);
    };
    let current = parse_alert_status_or_default(&current);

    if !current.can_transition_to(next) {
        return Ok(StatusUpdate::Rejected { current });
    }

    tx.execute(
        "UPDATE security_alerts SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![next.as_str(), now_text(), id],
    )
    .context("Failed to update alert status")?;

    let record = get_alert(&tx, id)?;
    tx.commit().context("Failed to commit status change")?;

    Ok(match record {
        Some(record) => StatusUpdate::Updated(record),
        None => StatusUpdate::NotFound,
    })
}

/// Alert counts per severity. Acknowledged alerts are still unresolved
/// exposure and are included when `include_acknowledged` is set.
pub fn count_alerts_by_severity(
    conn: &Connection,
    include_acknowledged: bool,
) -> Result<SeverityCounts> {
    let mut stmt = conn.prepare(
        r#"
        SELECT severity, COUNT(*)
        FROM security_alerts
        WHERE status = 'open' OR (?1 AND status = 'acknowledged')
        GROUP BY severity
        "#,
    )?;

    let mut counts = SeverityCounts::default();
    let rows = stmt.query_map(params![include_acknowledged], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;
    for row in rows {
        let (severity, count) = row.context("Failed to read severity counts")?;
        counts.add(parse_alert_severity_or_default(&severity), count);
    }
    Ok(counts)
}

/// Store one observed port. Called per result so partial scans stay durable.
pub fn insert_scan_result(conn: &Connection, result: &ScanResult) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO scan_results (host, port, status, service, banner, scanned_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            result.host,
            result.port,
            result.status.as_str(),
            result.service,
            result.banner,
            result.scanned_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        ],
    )
    .context("Failed to insert scan result")?;

    Ok(conn.last_insert_rowid())
}

/// Most recent open-port observations, newest first.
pub fn get_port_scan_results(conn: &Connection, limit: usize) -> Result<Vec<ScanResult>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT host, port, status, service, banner, scanned_at
        FROM scan_results
        WHERE status = 'open'
        ORDER BY scanned_at DESC, id DESC
        LIMIT ?1
        "#,
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let results = stmt
        .query_map(params![limit], |row| {
            let status: String = row.get(2)?;
            Ok(ScanResult {
                host: row.get(0)?,
                port: row.get(1)?,
                status: status.parse().unwrap_or(PortStatus::Open),
                service: row.get(3)?,
                banner: row.get(4)?,
                scanned_at: parse_datetime_column(row.get::<_, String>(5)?, 5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read scan results")?;

    Ok(results)
}

/// Distinct hosts with at least one stored observation
pub fn count_scanned_hosts(conn: &Connection) -> Result<u32> {
    conn.query_row("SELECT COUNT(DISTINCT host) FROM scan_results", [], |row| {
        row.get(0)
    })
    .context("Failed to count scanned hosts")
}

/// Distinct `host:port` pairs ever observed open
pub fn count_open_endpoints(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COUNT(*) FROM (SELECT DISTINCT host, port FROM scan_results WHERE status = 'open')",
        [],
        |row| row.get(0),
    )
    .context("Failed to count open endpoints")
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let severity: String = row.get(1)?;
    let category: String = row.get(2)?;
    let status: String = row.get(8)?;

    Ok(AlertRecord {
        id: row.get(0)?,
        severity: parse_alert_severity_or_default(&severity),
        category: parse_alert_category_or_default(&category),
        title: row.get(3)?,
        description: row.get(4)?,
        device: row.get(5)?,
        dedupe_kind: row.get(6)?,
        generation: row.get(7)?,
        status: parse_alert_status_or_default(&status),
        created_at: parse_datetime_column(row.get::<_, String>(9)?, 9)?,
        updated_at: parse_datetime_column(row.get::<_, String>(10)?, 10)?,
        superseded_by: row.get(11)?,
    })
}

fn parse_datetime_column(s: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_alert_severity_or_default(s: &str) -> AlertSeverity {
    match s.parse() {
        Ok(value) => value,
        Err(_) => {
            crate::log_warn!("Unknown alert severity in database: {}", s);
            AlertSeverity::Info
        }
    }
}

fn parse_alert_category_or_default(s: &str) -> AlertCategory {
    match s.parse() {
        Ok(value) => value,
        Err(_) => {
            crate::log_warn!("Unknown alert category in database: {}", s);
            AlertCategory::Custom
        }
    }
}

// Unknown statuses are treated as open so they keep blocking duplicates.
fn parse_alert_status_or_default(s: &str) -> AlertStatus {
    match s.parse() {
        Ok(value) => value,
        Err(_) => {
            crate::log_warn!("Unknown alert status in database: {}", s);
            AlertStatus::Open
        }
    }
}
