//! SQLite database models

use serde::{Deserialize, Serialize};

/// Persisted download event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadEventRecord {
    /// RFC 3339 UTC
    pub created_at: String,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub category: String,
    pub format: String,
    pub file_name: String,
    pub row_count: Option<i64>,
    /// JSON object of the filter parameters
    pub filters: String,
    pub tier: Option<String>,
}

/// Outcome of a conditional rate-limit touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitTouch {
    /// Timestamp recorded
    Passed,
    /// Too soon; carries the stored timestamp (epoch ms)
    Rejected { last_request_ms: i64 },
}
