//! Minimum-interval rate-limit timestamps

use super::models::RateLimitTouch;
use crate::error::Result;
use rusqlite::{params, Connection};

/// Record `now_ms` for `key` unless the stored timestamp is younger than
/// `min_interval_ms`. Single statement, so concurrent callers cannot both
/// pass on the same key.
pub fn touch_rate_limit(conn: &Connection, key: &str, now_ms: i64, min_interval_ms: i64) -> Result<RateLimitTouch> {
    let changed = conn.execute(
        "INSERT INTO rate_limits (key, last_request_ms) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET last_request_ms = excluded.last_request_ms
         WHERE excluded.last_request_ms - rate_limits.last_request_ms >= ?3",
        params![key, now_ms, min_interval_ms],
    )?;

    if changed == 1 {
        return Ok(RateLimitTouch::Passed);
    }

    let last_request_ms: i64 = conn.query_row(
        "SELECT last_request_ms FROM rate_limits WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(RateLimitTouch::Rejected { last_request_ms })
}

pub fn prune_rate_limits(conn: &Connection, older_than_ms: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM rate_limits WHERE last_request_ms < ?1",
        params![older_than_ms],
    )?;
    Ok(deleted)
}
