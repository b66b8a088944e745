//! Alert Store: deduplicated, lifecycle-checked persistence of findings

use crate::alerts::{Alert, AlertStatus};
use crate::database::queries;
use crate::database::{AlertCreation, AlertRecord, Database, SeverityCounts, StatusUpdate};

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(String),
    #[error("alert {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: AlertStatus,
        to: AlertStatus,
    },
    #[error("alert storage failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Shared handle to the alert table. Cheap to clone.
#[derive(Clone)]
pub struct AlertStore {
    db: Database,
}

impl AlertStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Record a finding. Returns the existing id with `created = false` when
    /// the same condition is still open or acknowledged.
    pub fn create(&self, alert: &Alert) -> Result<AlertCreation, AlertError> {
        let mut conn = self.db.lock()?;
        let creation = queries::insert_alert_deduped(&mut conn, alert)?;
        if creation.created {
            crate::log_stderr!(
                "New {} alert {} for {}: {}",
                alert.severity,
                creation.id,
                alert.device,
                alert.title
            );
        } else {
            crate::log_debug!("Alert {} already active for {}", creation.id, alert.device);
        }
        Ok(creation)
    }

    /// [`AlertStore::create`] on the blocking pool, for async callers.
    pub async fn create_async(&self, alert: Alert) -> Result<AlertCreation, AlertError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.create(&alert))
            .await
            .map_err(|e| AlertError::Storage(anyhow::anyhow!("alert task failed: {}", e)))?
    }

    pub fn list(
        &self,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, AlertError> {
        let conn = self.db.lock()?;
        Ok(queries::list_alerts(&conn, status, limit)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<AlertRecord>, AlertError> {
        let conn = self.db.lock()?;
        Ok(queries::get_alert(&conn, id)?)
    }

    pub fn acknowledge(&self, id: &str) -> Result<AlertRecord, AlertError> {
        self.transition(id, AlertStatus::Acknowledged)
    }

    pub fn resolve(&self, id: &str) -> Result<AlertRecord, AlertError> {
        self.transition(id, AlertStatus::Resolved)
    }

    fn transition(&self, id: &str, next: AlertStatus) -> Result<AlertRecord, AlertError> {
        let mut conn = self.db.lock()?;
        match queries::update_alert_status(&mut conn, id, next)? {
            StatusUpdate::Updated(record) => Ok(record),
            StatusUpdate::NotFound => Err(AlertError::NotFound(id.to_string())),
            StatusUpdate::Rejected { current } => Err(AlertError::InvalidTransition {
                id: id.to_string(),
                from: current,
                to: next,
            }),
        }
    }

    /// Unresolved (open + acknowledged) alert counts per severity
    pub fn unresolved_counts(&self) -> Result<SeverityCounts, AlertError> {
        let conn = self.db.lock()?;
        Ok(queries::count_alerts_by_severity(&conn, true)?)
    }

    /// Open-only alert counts per severity
    pub fn open_counts(&self) -> Result<SeverityCounts, AlertError> {
        let conn = self.db.lock()?;
        Ok(queries::count_alerts_by_severity(&conn, false)?)
    }
}
