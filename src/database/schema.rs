//! Database schema definitions
//!
//! The engine owns exactly two tables: `security_alerts` and `scan_results`.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all database tables
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Security alerts: keyed by deterministic id, never deleted
        CREATE TABLE IF NOT EXISTS security_alerts (
            id TEXT PRIMARY KEY,
            severity TEXT NOT NULL,
            category TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            device TEXT NOT NULL,
            dedupe_kind TEXT NOT NULL,
            generation INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'open',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            -- Id of the next generation once this resolved alert is re-detected
            superseded_by TEXT
        );

        -- Scan results: one row per open port observation
        CREATE TABLE IF NOT EXISTS scan_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host TEXT NOT NULL,
            port INTEGER NOT NULL,
            status TEXT NOT NULL,
            service TEXT NOT NULL,
            banner TEXT,
            scanned_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_security_alerts_key
            ON security_alerts(device, category, dedupe_kind, generation);
        CREATE INDEX IF NOT EXISTS idx_security_alerts_status ON security_alerts(status);
        CREATE INDEX IF NOT EXISTS idx_scan_results_key ON scan_results(host, port, scanned_at);
        "#,
    )
    .context("Failed to create database tables")?;

    Ok(())
}
