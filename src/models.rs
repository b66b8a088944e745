//! Shared data models for the automation and assessment engine

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Placeholder written wherever a password would otherwise leave the process
pub const REDACTED: &str = "***";

/// Normalized device role used for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Router,
    Switch,
    Firewall,
    Server,
    Unknown,
}

impl DeviceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Router => "router",
            DeviceRole::Switch => "switch",
            DeviceRole::Firewall => "firewall",
            DeviceRole::Server => "server",
            DeviceRole::Unknown => "unknown",
        }
    }

    /// Inventory group name (`routers`, `switches`, ...)
    pub fn group_name(&self) -> &'static str {
        match self {
            DeviceRole::Router => "routers",
            DeviceRole::Switch => "switches",
            DeviceRole::Firewall => "firewalls",
            DeviceRole::Server => "servers",
            DeviceRole::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username/password pair.
///
/// The password is only reachable through [`Credentials::password`]; `Debug`
/// and `Serialize` both redact it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

impl Serialize for Credentials {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Credentials", 2)?;
        state.serialize_field("username", &self.username)?;
        state.serialize_field("password", REDACTED)?;
        state.end()
    }
}

/// A managed device, normalized at the inventory boundary.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub hostname: String,
    pub host: String,
    pub port: u16,
    pub role: DeviceRole,
    /// Role label as supplied by the caller, before normalization
    pub role_label: String,
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

impl Device {
    /// Canonical minimal constructor with default credentials and port.
    pub fn new(hostname: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            host: host.into(),
            port: crate::config::DEFAULT_MANAGEMENT_PORT,
            role: DeviceRole::Unknown,
            role_label: DeviceRole::Unknown.as_str().to_string(),
            credentials: Credentials::new(
                crate::config::DEFAULT_USERNAME,
                crate::config::DEFAULT_PASSWORD,
            ),
            tags: Vec::new(),
            vendor: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Keep the label as given; the role is its normalized group.
    pub fn with_role(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.role = crate::inventory::normalize_role(&label);
        self.role_label = label;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_vendor(mut self, vendor: Option<String>) -> Self {
        self.vendor = vendor;
        self
    }

    /// `host:port` label used for alert device keys
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
            PortStatus::Filtered => "filtered",
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PortStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(PortStatus::Open),
            "closed" => Ok(PortStatus::Closed),
            "filtered" => Ok(PortStatus::Filtered),
            _ => Err(format!("Unknown port status: {}", s)),
        }
    }
}

/// Outcome of a single port probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub host: String,
    pub port: u16,
    pub status: PortStatus,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn open(host: impl Into<String>, port: u16, service: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            status: PortStatus::Open,
            service: service.into(),
            banner: None,
            scanned_at: Utc::now(),
        }
    }

    pub fn with_banner(mut self, banner: Option<String>) -> Self {
        self.banner = banner;
        self
    }
}

/// A default credential pair that the device accepted
#[derive(Debug, Clone, Serialize)]
pub struct CredentialFinding {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub found_at: DateTime<Utc>,
}

impl CredentialFinding {
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            found_at: Utc::now(),
        }
    }
}
