//! Security alerts: types and the deduplicating store

pub mod store;
pub mod types;

pub use store::{AlertError, AlertStore};
pub use types::{Alert, AlertCategory, AlertSeverity, AlertStatus};
