//! Port scanning and service classification

pub mod services;
mod tcp;

pub use services::{assess_open_port, service_name};
pub use tcp::PortScanner;
