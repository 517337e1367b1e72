//! SQLite database module

pub mod models;
mod migrations;
mod download_events;
mod action_tokens;
mod identity;
mod rate_limits;
mod market_cache;

use crate::error::Result;
use crate::providers::types::CoinMarket;
use crate::providers::MarketCache;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use models::{DownloadEventRecord, RateLimitTouch};

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open (or create) the database file and apply migrations
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Private in-memory database, used by tests and the memory-only setup
    pub fn new_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Download Event Methods ==========

    pub fn insert_download_event(&self, event: &DownloadEventRecord) -> Result<i64> {
        let conn = self.conn.lock();
        download_events::insert_download_event(&conn, event)
    }

    pub fn recent_download_events(&self, limit: usize) -> Result<Vec<DownloadEventRecord>> {
        let conn = self.conn.lock();
        download_events::recent_download_events(&conn, limit)
    }

    pub fn prune_download_events(&self, cutoff: &str) -> Result<usize> {
        let conn = self.conn.lock();
        download_events::prune_download_events(&conn, cutoff)
    }

    // ========== Action Token Methods ==========

    pub fn insert_action_token(&self, user_id: &str, action: &str, token_hash: &str, expires_at_ms: i64) -> Result<()> {
        let conn = self.conn.lock();
        action_tokens::insert_action_token(&conn, user_id, action, token_hash, expires_at_ms)
    }

    pub fn consume_action_token(&self, user_id: &str, action: &str, token_hash: &str, now_ms: i64) -> Result<bool> {
        let conn = self.conn.lock();
        action_tokens::consume_action_token(&conn, user_id, action, token_hash, now_ms)
    }

    pub fn prune_action_tokens(&self, now_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();
        action_tokens::prune_action_tokens(&conn, now_ms)
    }

    // ========== Identity Methods ==========

    pub fn insert_session(&self, token_hash: &str, user_id: &str, expires_at_ms: i64) -> Result<()> {
        let conn = self.conn.lock();
        identity::insert_session(&conn, token_hash, user_id, expires_at_ms)
    }

    pub fn session_user(&self, token_hash: &str, now_ms: i64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        identity::session_user(&conn, token_hash, now_ms)
    }

    pub fn set_subscription_tier(&self, user_id: &str, tier: &str) -> Result<()> {
        let conn = self.conn.lock();
        identity::upsert_subscription_tier(&conn, user_id, tier)
    }

    pub fn subscription_tier(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        identity::subscription_tier(&conn, user_id)
    }

    pub fn prune_sessions(&self, now_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();
        identity::prune_sessions(&conn, now_ms)
    }

    // ========== Rate Limit Methods ==========

    pub fn touch_rate_limit(&self, key: &str, now_ms: i64, min_interval_ms: i64) -> Result<RateLimitTouch> {
        let conn = self.conn.lock();
        rate_limits::touch_rate_limit(&conn, key, now_ms, min_interval_ms)
    }

    pub fn prune_rate_limits(&self, older_than_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();
        rate_limits::prune_rate_limits(&conn, older_than_ms)
    }

    // ========== Market Snapshot Methods ==========

    pub fn store_market_snapshot(&self, payload: &str, fetched_at_ms: i64) -> Result<()> {
        let conn = self.conn.lock();
        market_cache::store_snapshot(&conn, payload, fetched_at_ms)
    }

    pub fn load_market_snapshot(&self, min_fetched_at_ms: i64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        market_cache::load_snapshot(&conn, min_fetched_at_ms)
    }
}

/// [`MarketCache`] over the `market_snapshots` table
pub struct SqliteMarketCache {
    db: Arc<SqliteDb>,
}

impl SqliteMarketCache {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MarketCache for SqliteMarketCache {
    async fn load_markets(&self, max_age: Duration) -> Result<Vec<CoinMarket>> {
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        match self.db.load_market_snapshot(cutoff)? {
            Some(payload) => Ok(serde_json::from_str(&payload)?),
            None => Ok(Vec::new()),
        }
    }

    async fn store_markets(&self, markets: &[CoinMarket]) -> Result<()> {
        let payload = serde_json::to_string(markets)?;
        self.db
            .store_market_snapshot(&payload, chrono::Utc::now().timestamp_millis())
    }
}
