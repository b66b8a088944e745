//! Database row models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{AlertCategory, AlertSeverity, AlertStatus};

/// A persisted security alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub title: String,
    pub description: String,
    pub device: String,
    pub dedupe_kind: String,
    pub generation: i64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// Result of a deduplicating insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCreation {
    pub id: String,
    /// False when an open or acknowledged alert already covered the finding
    pub created: bool,
    pub generation: i64,
}

/// Outcome of a status update attempt
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Updated(AlertRecord),
    NotFound,
    Rejected { current: AlertStatus },
}

/// Open alert counts per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: AlertSeverity, count: u32) {
        match severity {
            AlertSeverity::Critical => self.critical += count,
            AlertSeverity::High => self.high += count,
            AlertSeverity::Medium => self.medium += count,
            AlertSeverity::Low => self.low += count,
            AlertSeverity::Info => self.info += count,
        }
    }

    pub fn get(&self, severity: AlertSeverity) -> u32 {
        match severity {
            AlertSeverity::Critical => self.critical,
            AlertSeverity::High => self.high,
            AlertSeverity::Medium => self.medium,
            AlertSeverity::Low => self.low,
            AlertSeverity::Info => self.info,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low + self.info
    }
}
