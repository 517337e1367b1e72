//! Minimum-interval rate limiting for exports
//!
//! One timestamp per key. A request passes when at least the minimum
//! interval has elapsed since the last request that passed; a rejected
//! request does not move the timestamp.
//!
//! Two stores implement [`RateLimitStore`]: [`MemoryRateLimiter`] for a
//! single process and [`SqliteRateLimiter`] when several processes share
//! one database file.

mod memory;
mod sqlite;

use crate::error::Result;
use crate::export::{DownloadQuery, ExportFormat};
use crate::identity::Tier;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

pub use memory::MemoryRateLimiter;
pub use sqlite::SqliteRateLimiter;

/// Interval between ordinary downloads of the same category and format
pub const DOWNLOAD_MIN_INTERVAL: Duration = Duration::from_millis(1_000);

/// Entries untouched for this long are pruned
pub const RATE_LIMIT_RETENTION: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub ok: bool,
    /// Whole seconds until the key passes again; 0 when `ok`
    pub retry_after_seconds: u64,
}

impl RateLimitDecision {
    pub fn allowed() -> Self {
        Self {
            ok: true,
            retry_after_seconds: 0,
        }
    }

    /// Rejection with the remaining wait rounded up, never below one second
    pub fn rejected(remaining: Duration) -> Self {
        let secs = remaining.as_secs_f64().ceil() as u64;
        Self {
            ok: false,
            retry_after_seconds: secs.max(1),
        }
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn enforce_min_interval(&self, key: &str, min_interval: Duration) -> Result<RateLimitDecision>;

    /// Forget keys whose last pass is older than `max_age`
    async fn prune(&self, max_age: Duration) -> Result<usize>;
}

/// Excel refresh interval for a subscription tier
pub fn min_interval_for_tier(tier: Tier) -> Duration {
    match tier {
        Tier::Free | Tier::Starter => Duration::from_secs(60),
        Tier::Pro | Tier::Business => Duration::from_secs(10),
    }
}

/// Ordinary download key. The category is taken raw: the limiter runs
/// before the category is validated.
pub fn download_key(ip: &str, category: &str, format: ExportFormat) -> String {
    format!("download:{}:{}:{}", ip, category, format.as_str())
}

/// Excel refresh key, built from the raw query values so that two
/// differently shaped workbooks refresh independently
pub fn excel_key(tier: Tier, ip: &str, query: &DownloadQuery) -> String {
    let raw = |value: &Option<String>| value.clone().unwrap_or_default();
    format!(
        "excel:{}:{}:{}:{}:{}:{}:{}:{}",
        tier.as_str(),
        ip,
        raw(&query.category),
        raw(&query.fields),
        raw(&query.symbols),
        raw(&query.symbol),
        raw(&query.interval),
        raw(&query.limit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_rounds_up_to_at_least_one_second() {
        assert_eq!(RateLimitDecision::rejected(Duration::from_millis(1)).retry_after_seconds, 1);
        assert_eq!(RateLimitDecision::rejected(Duration::from_millis(1_001)).retry_after_seconds, 2);
        assert_eq!(RateLimitDecision::rejected(Duration::ZERO).retry_after_seconds, 1);
        assert!(!RateLimitDecision::rejected(Duration::from_secs(3)).ok);
    }

    #[test]
    fn test_tier_intervals() {
        assert_eq!(min_interval_for_tier(Tier::Free), Duration::from_secs(60));
        assert_eq!(min_interval_for_tier(Tier::Starter), Duration::from_secs(60));
        assert_eq!(min_interval_for_tier(Tier::Pro), Duration::from_secs(10));
        assert_eq!(min_interval_for_tier(Tier::Business), Duration::from_secs(10));
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            download_key("1.2.3.4", "order_book", ExportFormat::Csv),
            "download:1.2.3.4:order_book:csv"
        );

        let query = DownloadQuery {
            category: Some("historical_prices".to_string()),
            symbol: Some("eth".to_string()),
            limit: Some("50".to_string()),
            ..Default::default()
        };
        assert_eq!(
            excel_key(Tier::Pro, "1.2.3.4", &query),
            "excel:pro:1.2.3.4:historical_prices:::eth::50"
        );
    }
}
