//! TCP port scanning with a fixed-size worker pool

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::config::{BANNER_MAX_LEN, ScanConfig};
use crate::database::{Database, queries};
use crate::execution::CancelFlag;
use crate::models::{PortStatus, ScanResult};

use super::services::service_name;

/// Port scanner. Results for open ports are written to `scan_results` as
/// they are found when a database is attached.
#[derive(Clone)]
pub struct PortScanner {
    config: ScanConfig,
    db: Option<Database>,
}

enum ProbeAttempt {
    Open(ScanResult),
    Closed,
    Filtered,
}

impl PortScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config, db: None }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `host` on `ports` (or the configured defaults).
    ///
    /// At most `pool_size` connects are in flight at once, and each attempt
    /// (connect plus banner read) is bounded by the per-attempt timeout.
    /// Only open ports are returned, ordered by port number.
    pub async fn scan_device(&self, host: &str, ports: Option<&[u16]>) -> Vec<ScanResult> {
        self.scan_device_until(host, ports, &CancelFlag::new()).await
    }

    /// Like [`PortScanner::scan_device`], but workers stop taking ports once
    /// `cancel` is set. Attempts already in flight finish within their
    /// timeout; open ports found so far are still returned.
    pub async fn scan_device_until(
        &self,
        host: &str,
        ports: Option<&[u16]>,
        cancel: &CancelFlag,
    ) -> Vec<ScanResult> {
        let ports = dedupe_ports(ports.unwrap_or(&self.config.ports));
        if ports.is_empty() {
            return Vec::new();
        }

        let workers = self.config.pool_size.max(1).min(ports.len());
        crate::log_debug!(
            "Scanning {} ({} ports, {} workers, {:?} timeout)",
            host,
            ports.len(),
            workers,
            self.config.timeout
        );

        let (tx, rx) = mpsc::channel::<u16>(ports.len());
        for port in &ports {
            // Capacity equals the number of ports, so this never waits.
            if tx.send(*port).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let results: Arc<Mutex<Vec<ScanResult>>> = Arc::new(Mutex::new(Vec::new()));
        let host: Arc<str> = Arc::from(host);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let results = Arc::clone(&results);
            let host = Arc::clone(&host);
            let scanner = self.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.recv().await;
                    let Some(port) = next else {
                        break;
                    };

                    match scanner.probe_port(&host, port).await {
                        ProbeAttempt::Open(result) => {
                            scanner.persist(&result).await;
                            results.lock().await.push(result);
                        }
                        ProbeAttempt::Closed => {
                            crate::log_debug!("{}:{} {}", host, port, PortStatus::Closed);
                        }
                        ProbeAttempt::Filtered => {
                            crate::log_debug!("{}:{} {}", host, port, PortStatus::Filtered);
                        }
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                crate::log_warn!("Port scan worker failed: {}", e);
            }
        }

        let mut open = std::mem::take(&mut *results.lock().await);
        open.sort_by_key(|r| r.port);

        if cancel.is_cancelled() {
            crate::log_warn!("Scan of {} cancelled: {} open ports so far", host, open.len());
        } else {
            crate::log_stderr!("Scan of {} complete: {} open ports", host, open.len());
        }
        open
    }

    async fn probe_port(&self, host: &str, port: u16) -> ProbeAttempt {
        let deadline = Instant::now() + self.config.timeout;

        let mut stream =
            match tokio::time::timeout(self.config.timeout, TcpStream::connect((host, port))).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                    return ProbeAttempt::Closed;
                }
                Ok(Err(_)) | Err(_) => return ProbeAttempt::Filtered,
            };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = remaining.min(self.config.banner_timeout);
        let banner = read_banner(&mut stream, budget).await;

        ProbeAttempt::Open(ScanResult::open(host, port, service_name(port)).with_banner(banner))
    }

    // Storage errors never stop the scan.
    async fn persist(&self, result: &ScanResult) {
        let Some(db) = &self.db else {
            return;
        };
        let row = result.clone();
        let outcome = db
            .run_blocking(move |conn| queries::insert_scan_result(conn, &row))
            .await;
        if let Err(e) = outcome {
            crate::log_warn!(
                "Scan result for {}:{} not recorded: {:#}",
                result.host,
                result.port,
                e
            );
        }
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new(ScanConfig::from_env())
    }
}

fn dedupe_ports(ports: &[u16]) -> Vec<u16> {
    let mut seen = std::collections::HashSet::new();
    ports
        .iter()
        .copied()
        .filter(|p| *p > 0 && seen.insert(*p))
        .collect()
}

/// Read whatever the service volunteers within `budget`.
async fn read_banner(stream: &mut TcpStream, budget: Duration) -> Option<String> {
    if budget.is_zero() {
        return None;
    }

    let mut buf = vec![0u8; 1024];
    let n = match tokio::time::timeout(budget, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => n,
        _ => return None,
    };

    clean_banner(&buf[..n])
}

fn clean_banner(raw: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(BANNER_MAX_LEN)
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn fast_config() -> ScanConfig {
        ScanConfig::from_env()
            .with_timeout(Duration::from_millis(500))
            .with_banner_timeout(Duration::from_millis(200))
            .with_pool_size(10)
    }

    #[test]
    fn clean_banner_strips_control_and_truncates() {
        assert_eq!(clean_banner(b"SSH-2.0-OpenSSH\r\n").as_deref(), Some("SSH-2.0-OpenSSH"));
        assert_eq!(clean_banner(b"\r\n"), None);
        let long = vec![b'a'; 500];
        assert_eq!(clean_banner(&long).map(|b| b.len()), Some(BANNER_MAX_LEN));
    }

    #[test]
    fn dedupe_ports_keeps_first_occurrence() {
        assert_eq!(dedupe_ports(&[22, 80, 22, 0, 443]), vec![22, 80, 443]);
    }

    #[tokio::test]
    async fn captures_banner_from_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let _ = sock.write_all(b"SSH-2.0-TestServer\r\n").await;
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        });

        let scanner = PortScanner::new(fast_config());
        let results = scanner.scan_device("127.0.0.1", Some(&[port])).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].service, format!("port-{}", port));
        assert_eq!(results[0].banner.as_deref(), Some("SSH-2.0-TestServer"));
    }

    #[tokio::test]
    async fn open_results_are_persisted_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let db = Database::in_memory().unwrap();
        let scanner = PortScanner::new(fast_config()).with_database(db.clone());
        let results = scanner.scan_device("127.0.0.1", Some(&[port])).await;
        drop(listener);

        assert_eq!(results.len(), 1);
        let conn = db.lock().unwrap();
        let stored = queries::get_port_scan_results(&conn, 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].port, port);
    }

    #[tokio::test]
    async fn cancelled_scan_takes_no_further_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let scanner = PortScanner::new(fast_config());
        let results = scanner
            .scan_device_until("127.0.0.1", Some(&[port]), &cancel)
            .await;
        drop(listener);

        assert!(results.is_empty(), "open port must not be attempted after cancel");
    }

    #[tokio::test]
    async fn cancel_mid_scan_stops_before_the_queue_drains() {
        // One worker walking 40 unroutable ports would need 40 timeouts.
        let config = ScanConfig::from_env()
            .with_timeout(Duration::from_millis(200))
            .with_banner_timeout(Duration::ZERO)
            .with_pool_size(1);
        let ports: Vec<u16> = (20_000..20_040).collect();
        let cancel = CancelFlag::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let results = PortScanner::new(config)
            .scan_device_until("10.255.255.1", Some(&ports), &cancel)
            .await;

        assert!(results.is_empty());
        assert!(
            started.elapsed() < Duration::from_millis(1_500),
            "cancel took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn empty_port_list_returns_nothing() {
        let scanner = PortScanner::new(fast_config());
        assert!(scanner.scan_device("127.0.0.1", Some(&[])).await.is_empty());
    }
}
