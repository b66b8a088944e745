//! Credential Probe
//!
//! Tries a short, fixed list of factory-default credential pairs against a
//! management service. This is an exposure check, not a brute forcer: the
//! list is never extended and the loop stops at the first accepted pair.

pub mod ssh;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::models::{CredentialFinding, Credentials};

pub use ssh::{SshAuthenticator, SshExecutor};

/// Ordered default pairs; the first accepted one is reported.
pub const DEFAULT_CREDENTIALS: &[(&str, &str)] = &[
    ("admin", "admin"),
    ("admin", "password"),
    ("admin", ""),
    ("cisco", "cisco"),
    ("root", "root"),
];

/// Result of one login attempt that reached the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    /// The service could not be talked to at all; remaining pairs are skipped
    #[error("transport failure probing {host}:{port}: {reason}")]
    Transport {
        host: String,
        port: u16,
        reason: String,
    },
}

impl ProbeError {
    pub fn transport(host: &str, port: u16, reason: impl Into<String>) -> Self {
        ProbeError::Transport {
            host: host.to_string(),
            port,
            reason: reason.into(),
        }
    }
}

/// A login mechanism the probe can drive.
pub trait Authenticator: Send + Sync {
    fn protocol(&self) -> &'static str;

    /// Attempt a single login. Wrong credentials must come back as
    /// `Ok(AuthOutcome::Rejected)`; only failures to reach or speak to the
    /// service are errors.
    fn attempt<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<AuthOutcome, ProbeError>> + Send + 'a>>;
}

/// Probe with the default list and the configured per-attempt timeout.
pub async fn probe_credentials(
    authenticator: &dyn Authenticator,
    host: &str,
    port: u16,
) -> Result<Option<CredentialFinding>, ProbeError> {
    probe_credentials_with(
        authenticator,
        host,
        port,
        DEFAULT_CREDENTIALS,
        crate::config::credential_probe_timeout(),
    )
    .await
}

/// Probe `pairs` in order, stopping at the first accepted pair.
///
/// A rejection moves on to the next pair. A transport error or an attempt
/// exceeding `timeout` aborts the probe and is returned as an error, so an
/// unreachable service is never reported as "no weak credentials".
pub async fn probe_credentials_with(
    authenticator: &dyn Authenticator,
    host: &str,
    port: u16,
    pairs: &[(&str, &str)],
    timeout: Duration,
) -> Result<Option<CredentialFinding>, ProbeError> {
    for (index, (username, password)) in pairs.iter().enumerate() {
        let credentials = Credentials::new(*username, *password);

        let outcome =
            match tokio::time::timeout(timeout, authenticator.attempt(host, port, &credentials))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ProbeError::transport(
                        host,
                        port,
                        format!("login attempt timed out after {:?}", timeout),
                    ));
                }
            };

        match outcome {
            AuthOutcome::Accepted => {
                crate::log_warn!(
                    "Default {} credentials accepted on {}:{} (user '{}', attempt {})",
                    authenticator.protocol(),
                    host,
                    port,
                    username,
                    index + 1
                );
                return Ok(Some(CredentialFinding::new(host, port, credentials)));
            }
            AuthOutcome::Rejected => {
                crate::log_debug!("{}:{} rejected user '{}'", host, port, username);
            }
        }
    }

    Ok(None)
}
