//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_download_events", CREATE_DOWNLOAD_EVENTS_TABLE)?;
    run_migration(conn, "002_action_tokens", CREATE_ACTION_TOKENS_TABLE)?;
    run_migration(conn, "003_user_sessions", CREATE_USER_SESSIONS_TABLE)?;
    run_migration(conn, "004_user_profiles", CREATE_USER_PROFILES_TABLE)?;
    run_migration(conn, "005_rate_limits", CREATE_RATE_LIMITS_TABLE)?;
    run_migration(conn, "006_market_snapshots", CREATE_MARKET_SNAPSHOTS_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_DOWNLOAD_EVENTS_TABLE: &str = r#"
CREATE TABLE download_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    client_ip TEXT NOT NULL,
    user_agent TEXT,
    category TEXT NOT NULL,
    format TEXT NOT NULL,
    file_name TEXT NOT NULL,
    row_count INTEGER,
    filters TEXT NOT NULL DEFAULT '{}',
    tier TEXT
);

CREATE INDEX idx_download_events_created ON download_events(created_at);
CREATE INDEX idx_download_events_category ON download_events(category);
"#;

const CREATE_ACTION_TOKENS_TABLE: &str = r#"
CREATE TABLE action_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    token_hash TEXT NOT NULL UNIQUE,
    expires_at INTEGER NOT NULL,
    consumed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_action_tokens_expires ON action_tokens(expires_at);
"#;

const CREATE_USER_SESSIONS_TABLE: &str = r#"
CREATE TABLE user_sessions (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_USER_PROFILES_TABLE: &str = r#"
CREATE TABLE user_profiles (
    user_id TEXT PRIMARY KEY,
    subscription_tier TEXT NOT NULL DEFAULT 'free',
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_RATE_LIMITS_TABLE: &str = r#"
CREATE TABLE rate_limits (
    key TEXT PRIMARY KEY,
    last_request_ms INTEGER NOT NULL
);

CREATE INDEX idx_rate_limits_last ON rate_limits(last_request_ms);
"#;

const CREATE_MARKET_SNAPSHOTS_TABLE: &str = r#"
CREATE TABLE market_snapshots (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
"#;
