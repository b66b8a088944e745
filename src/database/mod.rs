//! SQLite persistence for alerts and scan results

mod connection;
pub mod models;
pub mod queries;
mod schema;

pub use connection::Database;
pub use models::{AlertCreation, AlertRecord, SeverityCounts, StatusUpdate};
