//! Database connection and initialization

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::schema;

/// How long a writer waits on another process holding the file lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const IN_MEMORY_PATH: &str = ":memory:";

/// Shared SQLite handle for alerts and scan results.
///
/// Clones share one connection behind a mutex, so a transaction run while
/// holding [`Database::lock`] is atomic against every other task in this
/// process. Async callers go through [`Database::run_blocking`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database file and applies the schema.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set database busy timeout")?;
        // CLI runs and a long scan may share the file
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("Failed to enable WAL journal")?;

        Self::from_connection(conn, path)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, PathBuf::from(IN_MEMORY_PATH))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Lock the connection, mapping poisoning to an error.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Run `f` against the locked connection on the blocking pool, keeping
    /// SQLite I/O and the std mutex off the async workers.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock()?;
            f(&mut conn)
        })
        .await
        .context("Database task panicked")?
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    /// Default database location, overridable with `NETAUTO_DB_PATH`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = crate::config::db_path_override() {
            return path;
        }

        #[cfg(target_os = "windows")]
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));

        #[cfg(not(target_os = "windows"))]
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        base.join("netauto").join("netauto.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_db_reports_memory_path() {
        let db = Database::in_memory().expect("Failed to create in-memory db");
        assert!(db.is_in_memory());
        assert_eq!(db.path().to_str(), Some(IN_MEMORY_PATH));
    }

    #[test]
    fn file_db_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested").join("alerts.db");
        let db = Database::new(path.clone()).expect("file db should open");
        assert!(path.exists());
        assert!(!db.is_in_memory());
        assert_eq!(db.path(), &path);
    }

    #[test]
    fn clones_share_one_connection() {
        let db = Database::in_memory().expect("Failed to create in-memory db");
        let clone = db.clone();
        clone
            .lock()
            .unwrap()
            .execute("CREATE TABLE marker (id INTEGER)", [])
            .unwrap();
        let found: i64 = db
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'marker'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(found, 1);
    }

    #[tokio::test]
    async fn run_blocking_sees_the_shared_connection() {
        let db = Database::in_memory().expect("Failed to create in-memory db");
        let tables: i64 = db
            .run_blocking(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('security_alerts', 'scan_results')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .expect("blocking query should run");
        assert_eq!(tables, 2);
    }
}
