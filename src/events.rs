//! Fire-and-forget download event logging

use crate::db::sqlite::{DownloadEventRecord, SqliteDb};
use crate::identity::Tier;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One completed download
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub category: String,
    pub format: String,
    pub file_name: String,
    pub row_count: Option<usize>,
    /// Filter parameters as sent
    pub filters: Map<String, Value>,
    pub tier: Option<Tier>,
}

impl DownloadEvent {
    fn into_record(self) -> DownloadEventRecord {
        DownloadEventRecord {
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            category: self.category,
            format: self.format,
            file_name: self.file_name,
            row_count: self.row_count.map(|n| n as i64),
            filters: Value::Object(self.filters).to_string(),
            tier: self.tier.map(|t| t.as_str().to_string()),
        }
    }
}

/// Persist `event` in the background. Failures are logged and dropped; the
/// handle is only for callers that want to wait (tests).
pub fn log_download_event(db: Arc<SqliteDb>, event: DownloadEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        let record = event.into_record();
        let result = tokio::task::spawn_blocking(move || db.insert_download_event(&record)).await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Failed to log download event: {}", e),
            Err(e) => tracing::warn!("Download event task failed: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> DownloadEvent {
        let mut filters = Map::new();
        filters.insert("symbol".to_string(), json!("ETH"));
        DownloadEvent {
            client_ip: "198.51.100.4".to_string(),
            user_agent: None,
            category: "historical_prices".to_string(),
            format: "csv".to_string(),
            file_name: "historical_prices_ETH_1d.csv".to_string(),
            row_count: Some(500),
            filters,
            tier: Some(Tier::Starter),
        }
    }

    #[tokio::test]
    async fn test_event_is_persisted() {
        let db = Arc::new(SqliteDb::new_in_memory().unwrap());
        log_download_event(db.clone(), event()).await.unwrap();

        let events = db.recent_download_events(5).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].row_count, Some(500));
        assert_eq!(events[0].tier.as_deref(), Some("starter"));
        assert_eq!(events[0].filters, r#"{"symbol":"ETH"}"#);
        assert!(events[0].created_at.ends_with('Z'));
    }
}
