//! Runner backend availability

use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Whether the automation runner can be used for this call.
///
/// Produced fresh by [`detect_capability`] for every invocation and passed
/// explicitly into the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackendCapability {
    Available { program: String, version: String },
    Unavailable { reason: String },
}

impl BackendCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, BackendCapability::Available { .. })
    }
}

/// Run `<program> --version` and report availability.
pub async fn detect_capability(program: &str, timeout: Duration) -> BackendCapability {
    let mut command = Command::new(program);
    command
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return BackendCapability::Unavailable {
                reason: format!("{} not runnable: {}", program, e),
            };
        }
        Err(_) => {
            return BackendCapability::Unavailable {
                reason: format!("{} --version timed out after {:?}", program, timeout),
            };
        }
    };

    if !output.status.success() {
        return BackendCapability::Unavailable {
            reason: format!("{} --version exited with {}", program, output.status),
        };
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    crate::log_debug!("Runner backend available: {} ({})", program, version);
    BackendCapability::Available {
        program: program.to_string(),
        version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let capability =
            detect_capability("netauto-definitely-not-installed", Duration::from_secs(2)).await;
        assert!(!capability.is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_unavailable() {
        let capability = detect_capability("false", Duration::from_secs(2)).await;
        assert!(matches!(capability, BackendCapability::Unavailable { .. }));
    }
}
