//! Structured logging for the automation engine
//!
//! Console output goes to stderr in compact form so stdout stays free for
//! command results; a JSON copy of every event lands in a daily rotating
//! file.

pub mod macros;

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "netauto.log";

/// Where logs go and the fallback level when `RUST_LOG` is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub level: String,
}

impl LogSettings {
    /// `NETAUTO_LOG_DIR` and `NETAUTO_LOG_LEVEL`, falling back to the
    /// platform log directory and `info`.
    pub fn from_env() -> Result<Self> {
        Self::resolve(
            crate::config::log_dir_override(),
            crate::config::log_level(),
        )
    }

    fn resolve(dir_override: Option<PathBuf>, level: String) -> Result<Self> {
        let dir = match dir_override {
            Some(dir) => dir,
            None => default_log_directory()?,
        };
        Ok(Self { dir, level })
    }

    /// Today's file under [`LogSettings::dir`]
    pub fn current_file(&self) -> PathBuf {
        current_log_file_in(&self.dir)
    }
}

/// Install the global subscriber using [`LogSettings::from_env`].
///
/// Returns the log directory. A subscriber that is already installed (a
/// second call, or a test harness) is left in place.
pub fn init_logging() -> Result<PathBuf> {
    let settings = LogSettings::from_env()?;
    init_logging_with(&settings)?;
    Ok(settings.dir)
}

pub fn init_logging_with(settings: &LogSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.dir).with_context(|| {
        format!("Failed to create log directory {}", settings.dir.display())
    })?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &settings.dir, LOG_FILE_PREFIX);

    // Human-readable, stderr only
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .compact();

    // One JSON object per event for the log file
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .json();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", settings.level, e))?;

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => {
            tracing::info!(log_dir = %settings.dir.display(), "Logging initialized");
            Ok(())
        }
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(anyhow!("Failed to install log subscriber: {}", e)),
    }
}

/// `~/.config/netauto/logs` on Linux, the local app data dir on Windows.
fn default_log_directory() -> Result<PathBuf> {
    let base_dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir().context("Could not find local data directory")?
    } else {
        dirs::config_dir().context("Could not find config directory")?
    };
    Ok(base_dir.join("netauto").join("logs"))
}

fn current_log_file_in(dir: &Path) -> PathBuf {
    let today = chrono::Local::now().format("%Y-%m-%d");
    dir.join(format!("{}.{}", LOG_FILE_PREFIX, today))
}
