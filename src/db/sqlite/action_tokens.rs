//! Single-use action tokens (hash only, never the plaintext)

use crate::error::Result;
use rusqlite::{params, Connection};

pub fn insert_action_token(
    conn: &Connection,
    user_id: &str,
    action: &str,
    token_hash: &str,
    expires_at_ms: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO action_tokens (user_id, action, token_hash, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, action, token_hash, expires_at_ms],
    )?;
    Ok(())
}

/// Mark a live token consumed. Returns false when no unconsumed, unexpired
/// token matches all three of user, action and hash.
pub fn consume_action_token(
    conn: &Connection,
    user_id: &str,
    action: &str,
    token_hash: &str,
    now_ms: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE action_tokens SET consumed = 1
         WHERE token_hash = ?1 AND user_id = ?2 AND action = ?3
           AND consumed = 0 AND expires_at > ?4",
        params![token_hash, user_id, action, now_ms],
    )?;
    Ok(changed == 1)
}

/// Drop consumed tokens and tokens past expiry
pub fn prune_action_tokens(conn: &Connection, now_ms: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM action_tokens WHERE consumed = 1 OR expires_at <= ?1",
        params![now_ms],
    )?;
    Ok(deleted)
}
