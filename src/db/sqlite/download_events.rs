//! Download event log

use super::models::DownloadEventRecord;
use crate::error::Result;
use rusqlite::{params, Connection};

pub fn insert_download_event(conn: &Connection, event: &DownloadEventRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO download_events
            (created_at, client_ip, user_agent, category, format, file_name, row_count, filters, tier)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.created_at,
            event.client_ip,
            event.user_agent,
            event.category,
            event.format,
            event.file_name,
            event.row_count,
            event.filters,
            event.tier,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest first
pub fn recent_download_events(conn: &Connection, limit: usize) -> Result<Vec<DownloadEventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT created_at, client_ip, user_agent, category, format, file_name, row_count, filters, tier
         FROM download_events ORDER BY id DESC LIMIT ?1",
    )?;

    let events = stmt
        .query_map(params![limit as i64], |row| {
            Ok(DownloadEventRecord {
                created_at: row.get(0)?,
                client_ip: row.get(1)?,
                user_agent: row.get(2)?,
                category: row.get(3)?,
                format: row.get(4)?,
                file_name: row.get(5)?,
                row_count: row.get(6)?,
                filters: row.get(7)?,
                tier: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Delete events created before `cutoff` (RFC 3339, compared lexically)
pub fn prune_download_events(conn: &Connection, cutoff: &str) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM download_events WHERE created_at < ?1", params![cutoff])?;
    Ok(deleted)
}
