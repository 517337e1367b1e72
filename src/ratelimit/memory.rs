//! In-process rate-limit store

use super::{RateLimitDecision, RateLimitStore};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Last-pass instant per key
#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    entries: DashMap<String, Instant>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-record at an explicit instant. The entry lock is held for
    /// the whole read-modify-write, so one key cannot pass twice in a race.
    pub fn check_at(&self, key: &str, min_interval: Duration, now: Instant) -> RateLimitDecision {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < min_interval {
                    RateLimitDecision::rejected(min_interval - elapsed)
                } else {
                    entry.insert(now);
                    RateLimitDecision::allowed()
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                RateLimitDecision::allowed()
            }
        }
    }

    /// Drop entries older than `max_age`; returns how many were dropped
    pub fn prune_at(&self, max_age: Duration, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, last| {
            let keep = now.saturating_duration_since(*last) < max_age;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn enforce_min_interval(&self, key: &str, min_interval: Duration) -> Result<RateLimitDecision> {
        Ok(self.check_at(key, min_interval, Instant::now()))
    }

    async fn prune(&self, max_age: Duration) -> Result<usize> {
        Ok(self.prune_at(max_age, Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_first_request_passes() {
        let limiter = MemoryRateLimiter::new();
        assert!(limiter.check_at("k", SECOND, Instant::now()).ok);
    }

    #[test]
    fn test_second_request_within_interval_rejected() {
        let limiter = MemoryRateLimiter::new();
        let t0 = Instant::now();
        limiter.check_at("k", SECOND, t0);

        let decision = limiter.check_at("k", SECOND, t0 + Duration::from_millis(300));
        assert!(!decision.ok);
        assert_eq!(decision.retry_after_seconds, 1);
    }

    #[test]
    fn test_rejection_does_not_reset_window() {
        let limiter = MemoryRateLimiter::new();
        let t0 = Instant::now();
        let minute = Duration::from_secs(60);
        limiter.check_at("k", minute, t0);

        assert!(!limiter.check_at("k", minute, t0 + Duration::from_secs(50)).ok);
        let decision = limiter.check_at("k", minute, t0 + Duration::from_secs(55));
        assert_eq!(decision.retry_after_seconds, 5);
        assert!(limiter.check_at("k", minute, t0 + Duration::from_secs(60)).ok);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = MemoryRateLimiter::new();
        let t0 = Instant::now();
        assert!(limiter.check_at("a", SECOND, t0).ok);
        assert!(limiter.check_at("b", SECOND, t0).ok);
        assert!(!limiter.check_at("a", SECOND, t0).ok);
    }

    #[test]
    fn test_prune_drops_old_entries() {
        let limiter = MemoryRateLimiter::new();
        let t0 = Instant::now();
        limiter.check_at("old", SECOND, t0);
        limiter.check_at("new", SECOND, t0 + Duration::from_secs(3_000));

        assert_eq!(limiter.prune_at(Duration::from_secs(3_600), t0 + Duration::from_secs(3_700)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_prune_count_ignores_concurrent_inserts() {
        let limiter = MemoryRateLimiter::new();
        let t0 = Instant::now();
        for i in 0..100 {
            limiter.check_at(&format!("stale:{}", i), SECOND, t0);
        }
        let fresh_at = t0 + Duration::from_secs(4_000);

        let removed = std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    limiter.check_at(&format!("fresh:{}", i), SECOND, fresh_at);
                }
            });
            limiter.prune_at(Duration::from_secs(3_600), t0 + Duration::from_secs(3_700))
        });

        assert_eq!(removed, 100);
        assert_eq!(limiter.len(), 500);
    }

    #[tokio::test]
    async fn test_concurrent_callers_single_pass() {
        let limiter = std::sync::Arc::new(MemoryRateLimiter::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.enforce_min_interval("k", Duration::from_secs(60)).await.unwrap().ok
            }));
        }

        let mut passed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                passed += 1;
            }
        }
        assert_eq!(passed, 1);
    }
}
