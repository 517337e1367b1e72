//! Rate-limit store shared through the SQLite database

use super::{RateLimitDecision, RateLimitStore};
use crate::db::sqlite::{RateLimitTouch, SqliteDb};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteRateLimiter {
    db: Arc<SqliteDb>,
}

impl SqliteRateLimiter {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }

    pub fn check_at(&self, key: &str, min_interval: Duration, now_ms: i64) -> Result<RateLimitDecision> {
        let interval_ms = min_interval.as_millis() as i64;
        match self.db.touch_rate_limit(key, now_ms, interval_ms)? {
            RateLimitTouch::Passed => Ok(RateLimitDecision::allowed()),
            RateLimitTouch::Rejected { last_request_ms } => {
                let remaining_ms = (last_request_ms + interval_ms - now_ms).max(0) as u64;
                Ok(RateLimitDecision::rejected(Duration::from_millis(remaining_ms)))
            }
        }
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimiter {
    async fn enforce_min_interval(&self, key: &str, min_interval: Duration) -> Result<RateLimitDecision> {
        self.check_at(key, min_interval, chrono::Utc::now().timestamp_millis())
    }

    async fn prune(&self, max_age: Duration) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        self.db.prune_rate_limits(cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> SqliteRateLimiter {
        SqliteRateLimiter::new(Arc::new(SqliteDb::new_in_memory().unwrap()))
    }

    #[test]
    fn test_same_contract_as_memory_store() {
        let limiter = limiter();
        let minute = Duration::from_secs(60);

        assert!(limiter.check_at("k", minute, 0).unwrap().ok);

        let decision = limiter.check_at("k", minute, 50_000).unwrap();
        assert!(!decision.ok);
        assert_eq!(decision.retry_after_seconds, 10);

        let decision = limiter.check_at("k", minute, 59_500).unwrap();
        assert_eq!(decision.retry_after_seconds, 1);

        assert!(limiter.check_at("k", minute, 60_000).unwrap().ok);
        assert!(limiter.check_at("other", minute, 60_000).unwrap().ok);
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_keys() {
        let limiter = limiter();
        limiter
            .enforce_min_interval("fresh", Duration::from_secs(1))
            .await
            .unwrap();
        limiter.check_at("stale", Duration::from_secs(1), 0).unwrap();

        assert_eq!(limiter.prune(Duration::from_secs(3_600)).await.unwrap(), 1);
    }
}
