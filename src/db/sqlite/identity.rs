//! Local sessions and subscription profiles

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert_session(conn: &Connection, token_hash: &str, user_id: &str, expires_at_ms: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO user_sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token_hash, user_id, expires_at_ms],
    )?;
    Ok(())
}

/// User id of a live session
pub fn session_user(conn: &Connection, token_hash: &str, now_ms: i64) -> Result<Option<String>> {
    let user = conn
        .query_row(
            "SELECT user_id FROM user_sessions WHERE token_hash = ?1 AND expires_at > ?2",
            params![token_hash, now_ms],
            |row| row.get(0),
        )
        .optional()?;
    Ok(user)
}

pub fn upsert_subscription_tier(conn: &Connection, user_id: &str, tier: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO user_profiles (user_id, subscription_tier) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET
            subscription_tier = excluded.subscription_tier,
            updated_at = datetime('now')",
        params![user_id, tier],
    )?;
    Ok(())
}

pub fn subscription_tier(conn: &Connection, user_id: &str) -> Result<Option<String>> {
    let tier = conn
        .query_row(
            "SELECT subscription_tier FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(tier)
}

pub fn prune_sessions(conn: &Connection, now_ms: i64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM user_sessions WHERE expires_at <= ?1", params![now_ms])?;
    Ok(deleted)
}
