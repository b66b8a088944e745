//! Alert types for security findings
//!
//! Severity, category and lifecycle status, plus the [`Alert`] builder the
//! scanners fill in before handing a finding to the store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl AlertSeverity {
    pub const ALL: [AlertSeverity; 5] = [
        AlertSeverity::Critical,
        AlertSeverity::High,
        AlertSeverity::Medium,
        AlertSeverity::Low,
        AlertSeverity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::High => "high",
            AlertSeverity::Medium => "medium",
            AlertSeverity::Low => "low",
            AlertSeverity::Info => "info",
        }
    }

    /// Sort rank, 0 = most severe
    pub fn rank(&self) -> u8 {
        match self {
            AlertSeverity::Critical => 0,
            AlertSeverity::High => 1,
            AlertSeverity::Medium => 2,
            AlertSeverity::Low => 3,
            AlertSeverity::Info => 4,
        }
    }

    /// Points deducted from the security score per open alert
    pub fn score_weight(&self) -> u32 {
        match self {
            AlertSeverity::Critical => 25,
            AlertSeverity::High => 15,
            AlertSeverity::Medium => 7,
            AlertSeverity::Low => 3,
            AlertSeverity::Info => 0,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(AlertSeverity::Critical),
            "high" => Ok(AlertSeverity::High),
            "medium" => Ok(AlertSeverity::Medium),
            "low" => Ok(AlertSeverity::Low),
            "info" => Ok(AlertSeverity::Info),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// What kind of exposure an alert describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Device accepted a default credential pair
    WeakCredentials,
    /// Cleartext or commonly attacked service is listening
    InsecureService,
    /// Management banner reveals a legacy protocol or configuration
    LegacyConfiguration,
    Custom,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::WeakCredentials => "weak_credentials",
            AlertCategory::InsecureService => "insecure_service",
            AlertCategory::LegacyConfiguration => "legacy_configuration",
            AlertCategory::Custom => "custom",
        }
    }

    pub fn default_severity(&self) -> AlertSeverity {
        match self {
            AlertCategory::WeakCredentials => AlertSeverity::Critical,
            AlertCategory::InsecureService => AlertSeverity::Medium,
            AlertCategory::LegacyConfiguration => AlertSeverity::High,
            AlertCategory::Custom => AlertSeverity::Info,
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weak_credentials" => Ok(AlertCategory::WeakCredentials),
            "insecure_service" => Ok(AlertCategory::InsecureService),
            "legacy_configuration" => Ok(AlertCategory::LegacyConfiguration),
            "custom" => Ok(AlertCategory::Custom),
            _ => Err(format!("Unknown alert category: {}", s)),
        }
    }
}

/// Alert lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// open → acknowledged, open → resolved, acknowledged → resolved
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Open, AlertStatus::Acknowledged)
                | (AlertStatus::Open, AlertStatus::Resolved)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
        )
    }

    /// Open and acknowledged alerts block a duplicate insert.
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" | "ack" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("Unknown alert status: {}", s)),
        }
    }
}

/// A detected finding, not yet persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub device: String,
    /// Finding kind within the category; `(device, category, dedupe_kind)`
    /// identifies "the same condition" across scans
    pub dedupe_kind: String,
}

impl Alert {
    pub fn new(category: AlertCategory, title: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.default_severity(),
            title: title.into(),
            description: String::new(),
            device: String::new(),
            dedupe_kind: category.as_str().to_string(),
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dedupe_kind(mut self, kind: impl Into<String>) -> Self {
        self.dedupe_kind = kind.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transitions_are_allowed() {
        use AlertStatus::*;
        assert!(Open.can_transition_to(Acknowledged));
        assert!(Open.can_transition_to(Resolved));
        assert!(Acknowledged.can_transition_to(Resolved));
        assert!(!Acknowledged.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Acknowledged));
        assert!(!Open.can_transition_to(Open));
    }

    #[test]
    fn severity_rank_orders_critical_first() {
        let mut all = AlertSeverity::ALL.to_vec();
        all.reverse();
        all.sort_by_key(|s| s.rank());
        assert_eq!(all, AlertSeverity::ALL.to_vec());
    }

    #[test]
    fn builder_defaults_from_category() {
        let alert = Alert::new(AlertCategory::WeakCredentials, "Default login").with_device("h:22");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.dedupe_kind, "weak_credentials");
        assert_eq!(alert.device, "h:22");
    }
}
