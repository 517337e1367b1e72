//! Cached coin-market snapshot (single row)

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub fn store_snapshot(conn: &Connection, payload: &str, fetched_at_ms: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO market_snapshots (id, payload, fetched_at) VALUES (1, ?1, ?2)",
        params![payload, fetched_at_ms],
    )?;
    Ok(())
}

/// Payload fetched at or after `min_fetched_at_ms`
pub fn load_snapshot(conn: &Connection, min_fetched_at_ms: i64) -> Result<Option<String>> {
    let payload = conn
        .query_row(
            "SELECT payload FROM market_snapshots WHERE id = 1 AND fetched_at >= ?1",
            params![min_fetched_at_ms],
            |row| row.get(0),
        )
        .optional()?;
    Ok(payload)
}
