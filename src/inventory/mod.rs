//! Inventory Builder
//!
//! Turns heterogeneous device records into a typed, deduplicated
//! [`TargetSet`] and renders the runner's YAML inventory document.

pub mod render;
pub mod roles;

use crate::config::{DEFAULT_MANAGEMENT_PORT, DEFAULT_PASSWORD, DEFAULT_USERNAME};
use crate::models::{Credentials, Device, DeviceRole};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

pub use render::render_inventory;
pub use roles::{network_os, normalize_role};

const HOSTNAME_KEYS: &[&str] = &["hostname", "name"];
const ADDRESS_KEYS: &[&str] = &["ip_address", "host", "ip", "address"];
const PORT_KEYS: &[&str] = &["port", "ansible_port", "ssh_port"];
const ROLE_KEYS: &[&str] = &["device_type", "role", "type"];
const USERNAME_KEYS: &[&str] = &["username", "user"];

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to read device list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("device list is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("device list must be a JSON array or an object with a `devices` array")]
    NotAList,
    #[error("failed to render inventory: {0}")]
    Render(#[from] serde_yaml::Error),
}

/// Non-fatal problem found while building a target set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    NotAnObject { index: usize },
    MissingAddress { index: usize },
    InvalidPort { index: usize, value: String },
    Duplicate { index: usize, endpoint: String },
    HostnameRenamed { index: usize, from: String, to: String },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::NotAnObject { index } => {
                write!(f, "record {} is not an object, skipped", index)
            }
            BuildWarning::MissingAddress { index } => {
                write!(f, "record {} has no usable address, skipped", index)
            }
            BuildWarning::InvalidPort { index, value } => {
                write!(f, "record {} has invalid port '{}', skipped", index, value)
            }
            BuildWarning::Duplicate { index, endpoint } => {
                write!(f, "record {} duplicates {}, skipped", index, endpoint)
            }
            BuildWarning::HostnameRenamed { index, from, to } => {
                write!(f, "record {} hostname '{}' already used, renamed to '{}'", index, from, to)
            }
        }
    }
}

/// Ordered, deduplicated devices for one operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetSet {
    devices: Vec<Device>,
}

impl TargetSet {
    /// Build from already-typed devices, dropping repeated `(host, port)` pairs.
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut seen = HashSet::new();
        let devices = devices
            .into_iter()
            .filter(|d| seen.insert((d.host.clone(), d.port)))
            .collect();
        Self { devices }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices grouped by normalized role, insertion order kept within a group.
    pub fn groups(&self) -> BTreeMap<DeviceRole, Vec<&Device>> {
        let mut groups: BTreeMap<DeviceRole, Vec<&Device>> = BTreeMap::new();
        for device in &self.devices {
            groups.entry(device.role).or_default().push(device);
        }
        groups
    }

    /// Restrict to devices whose hostname, role or tags match `selector`.
    /// `all` (or an empty selector) keeps everything.
    pub fn select(&self, selector: &str) -> TargetSet {
        let selector = selector.trim();
        if selector.is_empty() || selector.eq_ignore_ascii_case("all") {
            return self.clone();
        }
        let wanted = normalize_role(selector);
        let devices = self
            .devices
            .iter()
            .filter(|d| {
                d.hostname == selector
                    || d.role.group_name() == selector
                    || (wanted != DeviceRole::Unknown && d.role == wanted)
                    || d.tags.iter().any(|t| t == selector)
            })
            .cloned()
            .collect();
        TargetSet { devices }
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

/// Result of [`build_target_set`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct InventoryBuild {
    pub targets: TargetSet,
    pub warnings: Vec<BuildWarning>,
}

fn first_str<'a>(record: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn first_value<'a>(record: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
}

fn parse_port_value(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    }?;
    (port > 0).then_some(port)
}

/// Split `host`, `host:port`, `[v6]:port` or a bare IPv6 address.
///
/// Returns the host and the embedded port text, if any.
pub fn split_address(address: &str) -> (&str, Option<&str>) {
    let address = address.trim();
    if let Some(rest) = address.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        return (host, tail.strip_prefix(':'));
    }
    match address.matches(':').count() {
        1 => {
            let (host, port) = address.split_once(':').unwrap_or((address, ""));
            (host, Some(port))
        }
        _ => (address, None),
    }
}

fn parse_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

enum RecordOutcome {
    Device(Device),
    Skip(BuildWarning),
}

fn parse_record(index: usize, record: &Value) -> RecordOutcome {
    let Some(record) = record.as_object() else {
        return RecordOutcome::Skip(BuildWarning::NotAnObject { index });
    };

    let Some(address) = first_str(record, ADDRESS_KEYS) else {
        return RecordOutcome::Skip(BuildWarning::MissingAddress { index });
    };

    let (host, embedded_port) = split_address(address);
    if host.is_empty() {
        return RecordOutcome::Skip(BuildWarning::MissingAddress { index });
    }

    let port = match embedded_port {
        Some(raw) => match raw.trim().parse::<u16>().ok().filter(|p| *p > 0) {
            Some(p) => p,
            None => {
                return RecordOutcome::Skip(BuildWarning::InvalidPort {
                    index,
                    value: raw.to_string(),
                });
            }
        },
        None => match first_value(record, PORT_KEYS) {
            Some(value) => match parse_port_value(value) {
                Some(p) => p,
                None => {
                    return RecordOutcome::Skip(BuildWarning::InvalidPort {
                        index,
                        value: value.to_string(),
                    });
                }
            },
            None => DEFAULT_MANAGEMENT_PORT,
        },
    };

    let role_label = first_str(record, ROLE_KEYS).unwrap_or("unknown");
    let username = first_str(record, USERNAME_KEYS).unwrap_or(DEFAULT_USERNAME);
    // An explicit empty password is kept; only a missing one falls back.
    let password = record
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PASSWORD);

    let hostname = first_str(record, HOSTNAME_KEYS).unwrap_or(host);
    RecordOutcome::Device(
        Device::new(hostname, host)
            .with_port(port)
            .with_role(role_label)
            .with_credentials(Credentials::new(username, password))
            .with_tags(parse_tags(record.get("tags")))
            .with_vendor(first_str(record, &["vendor"]).map(str::to_string)),
    )
}

/// Build a [`TargetSet`] from raw device records.
///
/// Bad records never fail the build: they are skipped and reported in
/// [`InventoryBuild::warnings`].
pub fn build_target_set(records: &[Value]) -> InventoryBuild {
    let mut devices = Vec::with_capacity(records.len());
    let mut warnings = Vec::new();
    let mut endpoints = HashSet::new();
    let mut hostnames = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let mut device = match parse_record(index, record) {
            RecordOutcome::Device(d) => d,
            RecordOutcome::Skip(w) => {
                crate::log_warn!("Inventory: {}", w);
                warnings.push(w);
                continue;
            }
        };

        if !endpoints.insert((device.host.clone(), device.port)) {
            let w = BuildWarning::Duplicate {
                index,
                endpoint: device.endpoint(),
            };
            crate::log_warn!("Inventory: {}", w);
            warnings.push(w);
            continue;
        }

        if !hostnames.insert(device.hostname.clone()) {
            let renamed = format!("{}_{}", device.hostname, device.port);
            let renamed = if hostnames.contains(&renamed) {
                format!("{}_{}", device.hostname, index)
            } else {
                renamed
            };
            warnings.push(BuildWarning::HostnameRenamed {
                index,
                from: device.hostname.clone(),
                to: renamed.clone(),
            });
            hostnames.insert(renamed.clone());
            device.hostname = renamed;
        }

        devices.push(device);
    }

    crate::log_debug!(
        "Inventory built: {} devices, {} warnings",
        devices.len(),
        warnings.len()
    );

    InventoryBuild {
        targets: TargetSet { devices },
        warnings,
    }
}

/// Parse a device list document: either a JSON array or `{"devices": [...]}`.
pub fn parse_device_list(raw: &str) -> Result<Vec<Value>, InventoryError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("devices") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(InventoryError::NotAList),
        },
        _ => Err(InventoryError::NotAList),
    }
}

/// Read and parse a device list file.
pub fn load_device_file(path: &Path) -> Result<Vec<Value>, InventoryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_device_list(&raw)
}
