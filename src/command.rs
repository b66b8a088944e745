use std::path::PathBuf;

use crate::alerts::AlertStatus;

pub const DEFAULT_ALERT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Security scan over a device file
    Scan {
        devices: PathBuf,
        target: Option<String>,
        ports: Option<Vec<u16>>,
    },
    /// Run a named operation, or ad hoc commands when `commands` is non-empty
    Run {
        operation: Option<String>,
        devices: PathBuf,
        target: Option<String>,
        commands: Vec<String>,
        extra_vars: Vec<(String, String)>,
    },
    Alerts {
        status: Option<AlertStatus>,
        limit: usize,
    },
    Ack {
        id: String,
    },
    Resolve {
        id: String,
    },
    Overview,
    Capabilities,
    Playbooks,
    Help,
    Version,
}
