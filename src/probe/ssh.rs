//! SSH login probing and remote command execution
//!
//! libssh2 is blocking, so every session runs on the blocking pool and is
//! bounded by socket and session timeouts.

use std::future::Future;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::pin::Pin;
use std::time::Duration;

use super::{AuthOutcome, Authenticator, ProbeError};
use crate::execution::{CommandOutput, RemoteError, RemoteExecutor};
use crate::models::{Credentials, Device};

/// libssh2 `LIBSSH2_ERROR_AUTHENTICATION_FAILED`
const LIBSSH2_AUTH_FAILED: i32 = -18;

fn resolve(host: &str, port: u16) -> Result<SocketAddr, String> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {}: {}", host, e))?
        .next()
        .ok_or_else(|| format!("no address for {}", host))
}

/// TCP connect plus SSH handshake.
fn open_session(host: &str, port: u16, timeout: Duration) -> Result<ssh2::Session, String> {
    let addr = resolve(host, port)?;
    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| e.to_string())?;
    tcp.set_read_timeout(Some(timeout)).map_err(|e| e.to_string())?;
    tcp.set_write_timeout(Some(timeout)).map_err(|e| e.to_string())?;

    let mut session = ssh2::Session::new().map_err(|e| e.to_string())?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    session.handshake().map_err(|e| format!("handshake failed: {}", e))?;
    Ok(session)
}

fn is_auth_rejection(error: &ssh2::Error) -> bool {
    matches!(error.code(), ssh2::ErrorCode::Session(LIBSSH2_AUTH_FAILED))
}

fn login(
    host: &str,
    port: u16,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<AuthOutcome, ProbeError> {
    let session =
        open_session(host, port, timeout).map_err(|reason| ProbeError::transport(host, port, reason))?;

    match session.userauth_password(credentials.username(), credentials.password()) {
        Ok(()) if session.authenticated() => Ok(AuthOutcome::Accepted),
        Ok(()) => Ok(AuthOutcome::Rejected),
        Err(e) if is_auth_rejection(&e) => Ok(AuthOutcome::Rejected),
        Err(e) => Err(ProbeError::transport(host, port, e.to_string())),
    }
}

/// Password authentication against an SSH management port
#[derive(Debug, Clone)]
pub struct SshAuthenticator {
    timeout: Duration,
}

impl SshAuthenticator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SshAuthenticator {
    fn default() -> Self {
        Self::new(crate::config::credential_probe_timeout())
    }
}

impl Authenticator for SshAuthenticator {
    fn protocol(&self) -> &'static str {
        "ssh"
    }

    fn attempt<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<AuthOutcome, ProbeError>> + Send + 'a>> {
        let owned_host = host.to_string();
        let credentials = credentials.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            let blocking_host = owned_host.clone();
            tokio::task::spawn_blocking(move || login(&blocking_host, port, &credentials, timeout))
                .await
                .map_err(|e| ProbeError::transport(&owned_host, port, e.to_string()))?
        })
    }
}

fn run_commands(
    device: &Device,
    commands: &[String],
    timeout: Duration,
) -> Result<Vec<CommandOutput>, RemoteError> {
    let session = open_session(&device.host, device.port, timeout).map_err(RemoteError::Connect)?;

    if let Err(e) = session.userauth_password(
        device.credentials.username(),
        device.credentials.password(),
    ) {
        return Err(if is_auth_rejection(&e) {
            RemoteError::Auth(format!("user '{}' rejected", device.credentials.username()))
        } else {
            RemoteError::Connect(e.to_string())
        });
    }
    if !session.authenticated() {
        return Err(RemoteError::Auth(format!(
            "user '{}' rejected",
            device.credentials.username()
        )));
    }

    let mut outputs = Vec::with_capacity(commands.len());
    for command in commands {
        let failed = |e: &dyn std::fmt::Display| RemoteError::Command {
            command: command.clone(),
            reason: e.to_string(),
        };

        let mut channel = session.channel_session().map_err(|e| failed(&e))?;
        channel.exec(command).map_err(|e| failed(&e))?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(|e| failed(&e))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| failed(&e))?;

        channel.wait_close().map_err(|e| failed(&e))?;
        let exit_status = channel.exit_status().map_err(|e| failed(&e))?;

        outputs.push(CommandOutput {
            command: command.clone(),
            stdout,
            stderr,
            exit_status,
        });
    }

    Ok(outputs)
}

/// Direct-tier executor that runs each command on its own SSH channel
#[derive(Debug, Clone)]
pub struct SshExecutor {
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute<'a>(
        &'a self,
        device: &'a Device,
        commands: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<CommandOutput>, RemoteError>> + Send + 'a>> {
        let device = device.clone();
        let commands = commands.to_vec();
        let timeout = self.connect_timeout;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || run_commands(&device, &commands, timeout))
                .await
                .map_err(|e| RemoteError::Connect(e.to_string()))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_port_is_transport_error_not_rejection() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let auth = SshAuthenticator::new(Duration::from_millis(500));
        let creds = Credentials::new("admin", "admin");
        let result = auth.attempt("127.0.0.1", port, &creds).await;
        assert!(matches!(result, Err(ProbeError::Transport { .. })));
    }

    #[tokio::test]
    async fn non_ssh_service_is_transport_error() {
        use tokio::io::AsyncWriteExt;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let auth = SshAuthenticator::new(Duration::from_millis(500));
        let creds = Credentials::new("admin", "admin");
        let result = auth.attempt("127.0.0.1", port, &creds).await;
        assert!(matches!(result, Err(ProbeError::Transport { .. })));
    }

    #[tokio::test]
    async fn executor_reports_connect_failure() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let device = Device::new("r1", "127.0.0.1").with_port(port);
        let executor = SshExecutor::new(Duration::from_millis(500));
        let result = executor.execute(&device, &["uptime".to_string()]).await;
        assert!(matches!(result, Err(RemoteError::Connect(_))));
    }
}
