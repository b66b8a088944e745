//! Configuration constants for the automation and assessment engine

use std::path::PathBuf;
use std::time::Duration;

// ====== Port Scanner Configuration ======

/// Per-attempt TCP connect timeout
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Fixed number of concurrent port probes per scan
pub const SCAN_POOL_SIZE: usize = 10;

/// Upper bound on time spent reading a service banner from an open port
pub const BANNER_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Maximum banner bytes kept per port
pub const BANNER_MAX_LEN: usize = 200;

/// Well-known ports probed when no explicit list is given
pub const DEFAULT_SCAN_PORTS: &[u16] = &[21, 22, 23, 53, 80, 161, 443, 3389, 5900, 8080, 8443];

/// Devices scanned concurrently within one batch
pub const BATCH_DEVICE_CONCURRENCY: usize = 4;

// ====== Credential Probe Configuration ======

/// Timeout for a single login attempt
pub const CREDENTIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

// ====== Execution Configuration ======

/// Playbook runner binary
pub const RUNNER_PLAYBOOK_PROGRAM: &str = "ansible-playbook";

/// Ad hoc runner binary
pub const RUNNER_ADHOC_PROGRAM: &str = "ansible";

/// Timeout for the runner `--version` availability check
pub const RUNNER_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard wall-clock ceiling for a runner job
pub const JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Directory holding pre-authored playbooks
pub const PLAYBOOK_DIR: &str = "ansible_playbooks";

/// Per-device ceiling for direct remote execution (connect + all commands)
pub const DIRECT_DEVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// SSH connect/handshake timeout for direct remote execution
pub const DIRECT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Devices executed concurrently by the direct tier
pub const DIRECT_CONCURRENCY: usize = 5;

/// Reachability check timeout used before choosing the direct tier
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Synthetic duration reported by simulated jobs
pub const SIMULATED_DURATION_MS: u64 = 500;

// ====== Inventory Defaults ======

pub const DEFAULT_MANAGEMENT_PORT: u16 = 22;
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    match env_var(name).and_then(|v| v.parse::<usize>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_duration_ms(name: &str, default: Duration, min: u64, max: u64) -> Duration {
    Duration::from_millis(env_parse_u64(
        name,
        default.as_millis() as u64,
        min,
        max,
    ))
}

/// Parses a comma-separated port list, dropping invalid entries and zero.
pub fn parse_port_list(raw: &str) -> Vec<u16> {
    raw.split(',')
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .collect()
}

/// Runtime-tunable port probe timeout.
/// Env: `NETAUTO_PORT_TIMEOUT_MS`
pub fn port_probe_timeout() -> Duration {
    env_duration_ms("NETAUTO_PORT_TIMEOUT_MS", PORT_PROBE_TIMEOUT, 50, 30_000)
}

/// Runtime-tunable scan worker pool size.
/// Env: `NETAUTO_SCAN_POOL_SIZE`
pub fn scan_pool_size() -> usize {
    env_parse_usize("NETAUTO_SCAN_POOL_SIZE", SCAN_POOL_SIZE, 1, 512)
}

/// Runtime-tunable banner read timeout.
/// Env: `NETAUTO_BANNER_TIMEOUT_MS`
pub fn banner_read_timeout() -> Duration {
    env_duration_ms("NETAUTO_BANNER_TIMEOUT_MS", BANNER_READ_TIMEOUT, 0, 10_000)
}

/// Runtime-tunable default port list.
/// Env: `NETAUTO_SCAN_PORTS` (comma-separated, e.g. `22,80,443`)
pub fn default_scan_ports() -> Vec<u16> {
    if let Some(raw) = env_var("NETAUTO_SCAN_PORTS") {
        let ports = parse_port_list(&raw);
        if !ports.is_empty() {
            return ports;
        }
    }
    DEFAULT_SCAN_PORTS.to_vec()
}

/// Runtime-tunable batch device concurrency.
/// Env: `NETAUTO_BATCH_CONCURRENCY`
pub fn batch_device_concurrency() -> usize {
    env_parse_usize("NETAUTO_BATCH_CONCURRENCY", BATCH_DEVICE_CONCURRENCY, 1, 64)
}

/// Runtime-tunable credential attempt timeout.
/// Env: `NETAUTO_CREDENTIAL_TIMEOUT_MS`
pub fn credential_probe_timeout() -> Duration {
    env_duration_ms(
        "NETAUTO_CREDENTIAL_TIMEOUT_MS",
        CREDENTIAL_PROBE_TIMEOUT,
        100,
        30_000,
    )
}

/// Env: `NETAUTO_RUNNER_PLAYBOOK_BIN`
pub fn runner_playbook_program() -> String {
    env_var("NETAUTO_RUNNER_PLAYBOOK_BIN").unwrap_or_else(|| RUNNER_PLAYBOOK_PROGRAM.to_string())
}

/// Env: `NETAUTO_RUNNER_ADHOC_BIN`
pub fn runner_adhoc_program() -> String {
    env_var("NETAUTO_RUNNER_ADHOC_BIN").unwrap_or_else(|| RUNNER_ADHOC_PROGRAM.to_string())
}

/// Env: `NETAUTO_RUNNER_CHECK_TIMEOUT_MS`
pub fn runner_check_timeout() -> Duration {
    env_duration_ms(
        "NETAUTO_RUNNER_CHECK_TIMEOUT_MS",
        RUNNER_CHECK_TIMEOUT,
        100,
        60_000,
    )
}

/// Runtime-tunable job wall-clock ceiling.
/// Env: `NETAUTO_JOB_TIMEOUT_SECS`
pub fn job_timeout() -> Duration {
    Duration::from_secs(env_parse_u64(
        "NETAUTO_JOB_TIMEOUT_SECS",
        JOB_TIMEOUT.as_secs(),
        1,
        86_400,
    ))
}

/// Env: `NETAUTO_PLAYBOOK_DIR`
pub fn playbook_dir() -> PathBuf {
    env_var("NETAUTO_PLAYBOOK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(PLAYBOOK_DIR))
}

/// Env: `NETAUTO_DIRECT_DEVICE_TIMEOUT_MS`
pub fn direct_device_timeout() -> Duration {
    env_duration_ms(
        "NETAUTO_DIRECT_DEVICE_TIMEOUT_MS",
        DIRECT_DEVICE_TIMEOUT,
        500,
        600_000,
    )
}

/// Env: `NETAUTO_DIRECT_CONNECT_TIMEOUT_MS`
pub fn direct_connect_timeout() -> Duration {
    env_duration_ms(
        "NETAUTO_DIRECT_CONNECT_TIMEOUT_MS",
        DIRECT_CONNECT_TIMEOUT,
        100,
        120_000,
    )
}

/// Env: `NETAUTO_DIRECT_CONCURRENCY`
pub fn direct_concurrency() -> usize {
    env_parse_usize("NETAUTO_DIRECT_CONCURRENCY", DIRECT_CONCURRENCY, 1, 256)
}

/// Env: `NETAUTO_REACHABILITY_TIMEOUT_MS`
pub fn reachability_timeout() -> Duration {
    env_duration_ms(
        "NETAUTO_REACHABILITY_TIMEOUT_MS",
        REACHABILITY_TIMEOUT,
        50,
        30_000,
    )
}

/// Database location override.
/// Env: `NETAUTO_DB_PATH`
pub fn db_path_override() -> Option<PathBuf> {
    env_var("NETAUTO_DB_PATH").map(PathBuf::from)
}

/// Level used when `RUST_LOG` is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Env: `NETAUTO_LOG_DIR`
pub fn log_dir_override() -> Option<PathBuf> {
    env_var("NETAUTO_LOG_DIR").map(PathBuf::from)
}

/// Env: `NETAUTO_LOG_LEVEL`
pub fn log_level() -> String {
    env_var("NETAUTO_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Settings for a port scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub ports: Vec<u16>,
    pub timeout: Duration,
    pub pool_size: usize,
    pub banner_timeout: Duration,
    pub device_concurrency: usize,
    pub credential_timeout: Duration,
}

impl ScanConfig {
    pub fn from_env() -> Self {
        Self {
            ports: default_scan_ports(),
            timeout: port_probe_timeout(),
            pool_size: scan_pool_size(),
            banner_timeout: banner_read_timeout(),
            device_concurrency: batch_device_concurrency(),
            credential_timeout: credential_probe_timeout(),
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_banner_timeout(mut self, banner_timeout: Duration) -> Self {
        self.banner_timeout = banner_timeout;
        self
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Settings for the automation runner tier.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub playbook_program: String,
    pub adhoc_program: String,
    pub playbook_dir: PathBuf,
    pub check_timeout: Duration,
    pub job_timeout: Duration,
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        Self {
            playbook_program: runner_playbook_program(),
            adhoc_program: runner_adhoc_program(),
            playbook_dir: playbook_dir(),
            check_timeout: runner_check_timeout(),
            job_timeout: job_timeout(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Settings for the direct remote execution tier.
#[derive(Debug, Clone)]
pub struct DirectConfig {
    pub device_timeout: Duration,
    pub connect_timeout: Duration,
    pub concurrency: usize,
    pub reachability_timeout: Duration,
}

impl DirectConfig {
    pub fn from_env() -> Self {
        Self {
            device_timeout: direct_device_timeout(),
            connect_timeout: direct_connect_timeout(),
            concurrency: direct_concurrency(),
            reachability_timeout: reachability_timeout(),
        }
    }
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
