//! Application state management

use crate::config::{IdentityConfig, RateLimitBackend, ServerConfig};
use crate::db::sqlite::{SqliteDb, SqliteMarketCache};
use crate::error::Result;
use crate::export::{CategoryRegistry, ExportSources};
use crate::identity::{IdentityBackend, LocalIdentity, RemoteIdentity};
use crate::providers::{HttpMarketData, MarketCache, MarketDataProvider};
use crate::ratelimit::{MemoryRateLimiter, RateLimitStore, SqliteRateLimiter};
use std::sync::Arc;

/// Application state shared by every request
pub struct AppState {
    pub config: ServerConfig,

    /// SQLite database (events, tokens, sessions, snapshots)
    pub db: Arc<SqliteDb>,

    pub rate_limiter: Arc<dyn RateLimitStore>,

    /// Upstream providers and the market snapshot cache
    pub sources: ExportSources,

    /// `None` when tier lookup is switched off
    pub identity: Option<Arc<dyn IdentityBackend>>,

    pub registry: Arc<CategoryRegistry>,
}

impl AppState {
    /// Build state from configuration: open the database, pick the stores
    pub fn new(config: ServerConfig) -> Result<Self> {
        tracing::info!("Opening database at {:?}", config.database_path);
        let db = Arc::new(SqliteDb::new(&config.database_path)?);
        let provider: Arc<dyn MarketDataProvider> = Arc::new(HttpMarketData::new(config.providers.clone())?);

        let identity: Option<Arc<dyn IdentityBackend>> = match &config.identity {
            IdentityConfig::Disabled => None,
            IdentityConfig::Local => Some(Arc::new(LocalIdentity::new(db.clone()))),
            IdentityConfig::Remote { url, api_key } => Some(Arc::new(RemoteIdentity::new(url, api_key)?)),
        };

        Ok(Self::with_parts(config, db, provider, identity))
    }

    /// Assemble state around an existing database and provider
    pub fn with_parts(
        config: ServerConfig,
        db: Arc<SqliteDb>,
        provider: Arc<dyn MarketDataProvider>,
        identity: Option<Arc<dyn IdentityBackend>>,
    ) -> Self {
        let rate_limiter: Arc<dyn RateLimitStore> = match config.rate_limit_backend {
            RateLimitBackend::Memory => Arc::new(MemoryRateLimiter::new()),
            RateLimitBackend::Sqlite => Arc::new(SqliteRateLimiter::new(db.clone())),
        };
        let cache: Arc<dyn MarketCache> = Arc::new(SqliteMarketCache::new(db.clone()));

        Self {
            config,
            db,
            rate_limiter,
            sources: ExportSources {
                provider,
                cache: Some(cache),
            },
            identity,
            registry: Arc::new(CategoryRegistry::new()),
        }
    }
}
