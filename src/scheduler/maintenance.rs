//! Maintenance scheduler

use crate::error::Result;
use crate::ratelimit::RATE_LIMIT_RETENTION;
use crate::state::AppState;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time between maintenance passes
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(600);

pub const DOWNLOAD_EVENT_RETENTION_DAYS: i64 = 90;

/// Rows removed by one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub rate_limits: usize,
    pub action_tokens: usize,
    pub sessions: usize,
    pub download_events: usize,
}

impl MaintenanceReport {
    pub fn total(&self) -> usize {
        self.rate_limits + self.action_tokens + self.sessions + self.download_events
    }
}

pub struct MaintenanceScheduler {
    state: Arc<AppState>,
    period: Duration,
}

impl MaintenanceScheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            period: MAINTENANCE_INTERVAL,
        }
    }

    /// Spawn the maintenance loop. The first pass runs immediately.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Maintenance scheduler started (every {}s)", self.period.as_secs());
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let report = self.run_once().await;
                if report.total() > 0 {
                    info!(
                        "Maintenance pruned {} rate limits, {} action tokens, {} sessions, {} download events",
                        report.rate_limits, report.action_tokens, report.sessions, report.download_events
                    );
                } else {
                    debug!("Maintenance pass: nothing to prune");
                }
            }
        })
    }

    pub async fn run_once(&self) -> MaintenanceReport {
        self.run_once_at(Utc::now()).await
    }

    /// One pass against `now`. Each step is independent; a failing step is
    /// logged and counted as zero.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let rate_limits = settle("rate limits", self.state.rate_limiter.prune(RATE_LIMIT_RETENTION).await);

        let db = self.state.db.clone();
        let pruned = tokio::task::spawn_blocking(move || {
            let now_ms = now.timestamp_millis();
            let cutoff = (now - ChronoDuration::days(DOWNLOAD_EVENT_RETENTION_DAYS))
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            (
                settle("action tokens", db.prune_action_tokens(now_ms)),
                settle("sessions", db.prune_sessions(now_ms)),
                settle("download events", db.prune_download_events(&cutoff)),
            )
        })
        .await;

        let (action_tokens, sessions, download_events) = match pruned {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Maintenance task failed: {}", e);
                (0, 0, 0)
            }
        };

        MaintenanceReport {
            rate_limits,
            action_tokens,
            sessions,
            download_events,
        }
    }
}

fn settle(what: &str, result: Result<usize>) -> usize {
    result.unwrap_or_else(|e| {
        warn!("Failed to prune {}: {}", what, e);
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitBackend, ServerConfig};
    use crate::db::sqlite::{DownloadEventRecord, SqliteDb};
    use crate::providers::fixture::FixtureProvider;

    fn event(created_at: &str) -> DownloadEventRecord {
        DownloadEventRecord {
            created_at: created_at.to_string(),
            client_ip: "203.0.113.5".to_string(),
            user_agent: None,
            category: "market_overview".to_string(),
            format: "csv".to_string(),
            file_name: "market_overview_2026-10-19.csv".to_string(),
            row_count: Some(12),
            filters: "{}".to_string(),
            tier: None,
        }
    }

    fn scheduler() -> MaintenanceScheduler {
        let config = ServerConfig {
            rate_limit_backend: RateLimitBackend::Sqlite,
            ..ServerConfig::default()
        };
        let db = Arc::new(SqliteDb::new_in_memory().unwrap());
        let state = Arc::new(AppState::with_parts(config, db, Arc::new(FixtureProvider::new()), None));
        MaintenanceScheduler::new(state)
    }

    #[tokio::test]
    async fn test_prunes_stale_rows_only() {
        let scheduler = scheduler();
        let db = scheduler.state.db.clone();
        let now: DateTime<Utc> = "2026-10-19T12:00:00Z".parse().unwrap();
        let now_ms = now.timestamp_millis();

        db.insert_download_event(&event("2026-05-01T00:00:00.000Z")).unwrap();
        db.insert_download_event(&event("2026-10-18T09:30:00.000Z")).unwrap();

        db.insert_action_token("user-1", "delete_account", "expired", now_ms - 1).unwrap();
        db.insert_action_token("user-1", "delete_account", "live", now_ms + 60_000).unwrap();

        db.insert_session("old-session", "user-1", now_ms - 1_000).unwrap();
        db.insert_session("new-session", "user-1", now_ms + 1_000).unwrap();

        let real_now_ms = Utc::now().timestamp_millis();
        db.touch_rate_limit("download:1.2.3.4:news:csv", real_now_ms - 2 * 3_600_000, 1_000).unwrap();
        db.touch_rate_limit("download:1.2.3.4:news:json", real_now_ms, 1_000).unwrap();

        let report = scheduler.run_once_at(now).await;
        assert_eq!(
            report,
            MaintenanceReport {
                rate_limits: 1,
                action_tokens: 1,
                sessions: 1,
                download_events: 1,
            }
        );

        let remaining = db.recent_download_events(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].created_at, "2026-10-18T09:30:00.000Z");
        assert!(db.consume_action_token("user-1", "delete_account", "live", now_ms).unwrap());
        assert_eq!(db.session_user("new-session", now_ms).unwrap().as_deref(), Some("user-1"));

        assert_eq!(scheduler.run_once_at(now).await.total(), 0);
    }
}
