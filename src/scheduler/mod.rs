//! Background maintenance
//!
//! Periodically prunes:
//! - rate-limit entries past their retention
//! - consumed or expired action tokens and expired sessions
//! - download events older than the event retention window

mod maintenance;

pub use maintenance::{MaintenanceReport, MaintenanceScheduler, DOWNLOAD_EVENT_RETENTION_DAYS, MAINTENANCE_INTERVAL};
