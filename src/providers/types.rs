//! Common provider types
//!
//! Provider-shaped records returned by [`super::MarketDataProvider`]. Optional
//! fields are optional upstream too; the row shapers decide how to fill them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Request parameters
// ============================================================================

/// Candle interval (Binance kline intervals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Mo1,
}

impl Interval {
    pub const ALL: [Interval; 10] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H4,
        Interval::H12,
        Interval::D1,
        Interval::W1,
        Interval::Mo1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
            Interval::Mo1 => "1M",
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::D1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Order book depth accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookDepth(u32);

impl BookDepth {
    pub const ALLOWED: [u32; 7] = [5, 10, 20, 50, 100, 500, 1000];

    pub fn new(levels: u32) -> Option<Self> {
        Self::ALLOWED.contains(&levels).then_some(Self(levels))
    }

    pub fn levels(&self) -> u32 {
        self.0
    }
}

impl Default for BookDepth {
    fn default() -> Self {
        Self(20)
    }
}

/// Which movers list to request upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoverKind {
    Gainers,
    Losers,
}

impl MoverKind {
    /// Value written into the `rank_type` column
    pub fn label(&self) -> &'static str {
        match self {
            MoverKind::Gainers => "GAINERS",
            MoverKind::Losers => "LOSERS",
        }
    }
}

/// News feed filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NewsFilter {
    Rising,
    Hot,
    Bullish,
    Bearish,
    Important,
}

impl NewsFilter {
    pub const ALL: [NewsFilter; 5] = [
        NewsFilter::Rising,
        NewsFilter::Hot,
        NewsFilter::Bullish,
        NewsFilter::Bearish,
        NewsFilter::Important,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsFilter::Rising => "rising",
            NewsFilter::Hot => "hot",
            NewsFilter::Bullish => "bullish",
            NewsFilter::Bearish => "bearish",
            NewsFilter::Important => "important",
        }
    }
}

impl FromStr for NewsFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NewsFilter::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Coin markets query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketQuery {
    /// CoinGecko category id, e.g. `layer-1`
    pub category: Option<String>,
    /// Upper case tickers; empty means top of market
    pub symbols: Vec<String>,
    pub per_page: u32,
}

// ============================================================================
// Market data (CoinGecko)
// ============================================================================

/// Coin market entry (`/coins/markets`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub total_volume: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d_in_currency: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub ath: Option<f64>,
    pub ath_change_percentage: Option<f64>,
    pub ath_date: Option<String>,
    pub atl: Option<f64>,
    pub atl_date: Option<String>,
    pub last_updated: Option<String>,
}

/// Trending search entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub score: u32,
    pub price_btc: Option<f64>,
    pub price_usd: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
}

/// Global market statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub active_cryptocurrencies: u64,
    pub markets: u64,
    pub total_market_cap_usd: f64,
    pub total_volume_usd: f64,
    pub market_cap_change_percentage_24h_usd: f64,
    /// (symbol, percent of total market cap), descending
    pub market_cap_percentage: Vec<(String, f64)>,
    pub updated_at: i64,
}

/// Coin category (`/coins/categories`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinCategory {
    pub id: String,
    pub name: String,
    pub market_cap: Option<f64>,
    pub market_cap_change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub updated_at: Option<String>,
}

/// Exchange listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exchange {
    pub id: String,
    pub name: String,
    pub country: Option<String>,
    pub year_established: Option<u32>,
    pub trust_score: Option<u32>,
    pub trust_score_rank: Option<u32>,
    pub trade_volume_24h_btc: Option<f64>,
    pub url: Option<String>,
}

/// Derivatives ticker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivativeTicker {
    pub market: String,
    pub symbol: String,
    pub index_id: Option<String>,
    pub price: Option<String>,
    pub price_percentage_change_24h: Option<f64>,
    pub contract_type: Option<String>,
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
    pub volume_24h: Option<f64>,
}

// ============================================================================
// Exchange data (Binance)
// ============================================================================

/// OHLCV candle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_volume: f64,
    pub trades: u64,
}

/// Single price level
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot with top-level aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
    pub spread: f64,
    pub spread_percent: f64,
    pub total_bid_volume: f64,
    pub total_ask_volume: f64,
}

impl OrderBook {
    /// Build a book and compute its aggregates from raw levels
    pub fn from_levels(symbol: &str, bids: Vec<OrderLevel>, asks: Vec<OrderLevel>) -> Self {
        let best_bid = bids.first().map(|l| l.price).unwrap_or(0.0);
        let best_ask = asks.first().map(|l| l.price).unwrap_or(0.0);
        let spread = if best_bid > 0.0 && best_ask > 0.0 {
            best_ask - best_bid
        } else {
            0.0
        };
        let spread_percent = if best_ask > 0.0 { spread / best_ask * 100.0 } else { 0.0 };

        Self {
            symbol: symbol.to_string(),
            total_bid_volume: bids.iter().map(|l| l.quantity).sum(),
            total_ask_volume: asks.iter().map(|l| l.quantity).sum(),
            bids,
            asks,
            spread,
            spread_percent,
        }
    }
}

/// Executed trade
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub price: f64,
    pub quantity: f64,
    pub quote_quantity: f64,
    pub time: i64,
    pub is_buyer_maker: bool,
}

/// 24h rolling ticker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
}

/// Perpetual funding rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    pub mark_price: f64,
    pub index_price: f64,
    pub funding_rate: f64,
    pub next_funding_time: i64,
}

/// Perpetual open interest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub symbol: String,
    pub open_interest: f64,
    pub time: i64,
}

// ============================================================================
// Sentiment index (Alternative.me)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FearGreedEntry {
    pub value: u32,
    pub classification: String,
    pub timestamp: i64,
}

// ============================================================================
// DeFi (DeFiLlama)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocol {
    pub name: String,
    pub symbol: Option<String>,
    pub category: Option<String>,
    pub chains: Vec<String>,
    pub tvl: Option<f64>,
    pub change_1d: Option<f64>,
    pub change_7d: Option<f64>,
    pub mcap: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainTvl {
    pub name: String,
    pub token_symbol: Option<String>,
    pub tvl: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YieldPool {
    pub pool: String,
    pub chain: String,
    pub project: String,
    pub symbol: String,
    pub tvl_usd: Option<f64>,
    pub apy: Option<f64>,
    pub apy_base: Option<f64>,
    pub apy_reward: Option<f64>,
    pub stablecoin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stablecoin {
    pub name: String,
    pub symbol: String,
    pub peg_type: Option<String>,
    pub peg_mechanism: Option<String>,
    pub circulating_usd: Option<f64>,
    pub price: Option<f64>,
    pub chains: Vec<String>,
}

/// DEX volume or fee/revenue overview entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolActivity {
    pub name: String,
    pub category: Option<String>,
    pub chains: Vec<String>,
    pub total_24h: Option<f64>,
    pub total_7d: Option<f64>,
    pub total_30d: Option<f64>,
    pub change_1d: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bridge {
    pub name: String,
    pub display_name: String,
    pub volume_prev_day: Option<f64>,
    pub volume_prev_2_day: Option<f64>,
    pub chains: Vec<String>,
}

// ============================================================================
// Social and news
// ============================================================================

/// Coin-level social metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialMetric {
    pub symbol: String,
    pub name: String,
    pub galaxy_score: Option<f64>,
    pub alt_rank: Option<u32>,
    pub sentiment: Option<f64>,
    pub social_volume_24h: Option<f64>,
    pub interactions_24h: Option<f64>,
    pub social_dominance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub title: String,
    pub url: Option<String>,
    pub creator: Option<String>,
    pub network: Option<String>,
    pub interactions: Option<f64>,
    pub sentiment: Option<f64>,
    pub created_at: Option<i64>,
}

/// Aggregate sentiment for one coin plus its constituent posts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinSentiment {
    pub summary: SocialMetric,
    pub posts: Vec<SocialPost>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub published_at: Option<String>,
    pub currencies: Vec<String>,
    pub votes_positive: u32,
    pub votes_negative: u32,
    pub kind: Option<String>,
}

// ============================================================================
// Explorer and whale tracking
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhaleTransaction {
    pub blockchain: String,
    pub symbol: String,
    pub hash: String,
    pub timestamp: i64,
    pub amount: f64,
    pub amount_usd: f64,
    pub from_owner: Option<String>,
    pub from_owner_type: Option<String>,
    pub to_owner: Option<String>,
    pub to_owner_type: Option<String>,
    pub transaction_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GasOracle {
    pub last_block: u64,
    pub safe_gwei: f64,
    pub propose_gwei: f64,
    pub fast_gwei: f64,
    pub base_fee_gwei: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockchainStats {
    pub market_price_usd: f64,
    pub hash_rate: f64,
    pub difficulty: f64,
    pub blocks_mined_24h: u64,
    pub minutes_between_blocks: f64,
    pub transactions_24h: u64,
    pub total_fees_btc: f64,
    pub estimated_transaction_volume_usd: f64,
    pub timestamp: i64,
}

// ============================================================================
// NFT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NftCollection {
    pub id: String,
    pub name: String,
    pub symbol: Option<String>,
    pub asset_platform_id: Option<String>,
    pub contract_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NftMarket {
    pub id: String,
    pub name: String,
    pub symbol: Option<String>,
    pub asset_platform_id: Option<String>,
    pub floor_price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub floor_price_change_24h: Option<f64>,
    pub owners: Option<u64>,
    pub total_supply: Option<u64>,
}
