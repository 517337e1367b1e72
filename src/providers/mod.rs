//! Upstream market data providers
//!
//! The export pipeline talks to upstream APIs only through
//! [`MarketDataProvider`]. [`http::HttpMarketData`] is the production
//! implementation; tests substitute a fixture provider.

pub mod types;
pub mod http;
#[cfg(test)]
pub mod fixture;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use types::*;

pub use http::HttpMarketData;

/// Data sources behind the export categories
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Coin markets ordered by market cap
    async fn coin_markets(&self, query: &MarketQuery) -> Result<Vec<CoinMarket>>;

    /// Biggest 24h movers in one direction
    async fn top_movers(&self, kind: MoverKind, limit: usize) -> Result<Vec<CoinMarket>>;

    /// Coin markets with supply and all-time-high detail
    async fn coin_details(&self, symbols: &[String]) -> Result<Vec<CoinMarket>>;

    async fn trending(&self) -> Result<Vec<TrendingCoin>>;

    async fn global_stats(&self) -> Result<GlobalStats>;

    async fn coin_categories(&self) -> Result<Vec<CoinCategory>>;

    async fn exchanges(&self, limit: usize) -> Result<Vec<Exchange>>;

    async fn derivatives(&self, limit: usize) -> Result<Vec<DerivativeTicker>>;

    /// Candles for a trading pair base symbol (e.g. `BTC`)
    async fn klines(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>>;

    async fn order_book(&self, symbol: &str, depth: BookDepth) -> Result<OrderBook>;

    async fn recent_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>>;

    async fn tickers_24h(&self, symbols: &[String]) -> Result<Vec<Ticker24h>>;

    async fn funding_rates(&self, symbols: &[String]) -> Result<Vec<FundingRate>>;

    async fn open_interest(&self, symbols: &[String]) -> Result<Vec<OpenInterest>>;

    async fn fear_greed(&self, limit: usize) -> Result<Vec<FearGreedEntry>>;

    async fn protocols(&self) -> Result<Vec<Protocol>>;

    async fn chain_tvl(&self) -> Result<Vec<ChainTvl>>;

    async fn yield_pools(&self) -> Result<Vec<YieldPool>>;

    async fn stablecoins(&self) -> Result<Vec<Stablecoin>>;

    async fn dex_volumes(&self) -> Result<Vec<ProtocolActivity>>;

    async fn fees_revenue(&self) -> Result<Vec<ProtocolActivity>>;

    async fn bridges(&self) -> Result<Vec<Bridge>>;

    async fn social_metrics(&self, limit: usize) -> Result<Vec<SocialMetric>>;

    async fn coin_sentiment(&self, symbol: &str) -> Result<CoinSentiment>;

    async fn news(&self, filter: Option<NewsFilter>, symbols: &[String]) -> Result<Vec<NewsArticle>>;

    async fn whale_transactions(&self, min_value_usd: u64) -> Result<Vec<WhaleTransaction>>;

    async fn gas_oracle(&self) -> Result<GasOracle>;

    async fn blockchain_stats(&self) -> Result<BlockchainStats>;

    async fn nft_collections(&self, chain: Option<&str>, limit: usize) -> Result<Vec<NftCollection>>;

    async fn nft_markets(&self, chain: Option<&str>, limit: usize) -> Result<Vec<NftMarket>>;
}

/// Cached snapshot of the top coin markets
#[async_trait]
pub trait MarketCache: Send + Sync {
    /// Markets fetched within `max_age`; empty when the snapshot is missing or stale
    async fn load_markets(&self, max_age: Duration) -> Result<Vec<CoinMarket>>;

    async fn store_markets(&self, markets: &[CoinMarket]) -> Result<()>;
}
