//! Export categories

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Closed set of downloadable data categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    MarketOverview,
    HistoricalPrices,
    TechnicalIndicators,
    OrderBook,
    RecentTrades,
    Ticker24h,
    GainersLosers,
    Trending,
    GlobalStats,
    Dominance,
    CoinCategories,
    Exchanges,
    Derivatives,
    FundingRates,
    OpenInterest,
    CoinDetails,
    FearGreed,
    DefiProtocols,
    ChainTvl,
    Yields,
    Stablecoins,
    DexVolumes,
    FeesRevenue,
    Bridges,
    SocialSentiment,
    SentimentCoin,
    News,
    WhaleTransactions,
    ExchangeFlows,
    GasPrices,
    BlockchainStats,
    NftCollections,
    NftStats,
}

/// Coarse grouping used by the catalogue and the feature gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryGroup {
    Market,
    Index,
    Defi,
    Social,
    Whale,
    Nft,
}

impl CategoryGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryGroup::Market => "market",
            CategoryGroup::Index => "index",
            CategoryGroup::Defi => "defi",
            CategoryGroup::Social => "social",
            CategoryGroup::Whale => "whale",
            CategoryGroup::Nft => "nft",
        }
    }
}

impl Category {
    pub const ALL: [Category; 33] = [
        Category::MarketOverview,
        Category::HistoricalPrices,
        Category::TechnicalIndicators,
        Category::OrderBook,
        Category::RecentTrades,
        Category::Ticker24h,
        Category::GainersLosers,
        Category::Trending,
        Category::GlobalStats,
        Category::Dominance,
        Category::CoinCategories,
        Category::Exchanges,
        Category::Derivatives,
        Category::FundingRates,
        Category::OpenInterest,
        Category::CoinDetails,
        Category::FearGreed,
        Category::DefiProtocols,
        Category::ChainTvl,
        Category::Yields,
        Category::Stablecoins,
        Category::DexVolumes,
        Category::FeesRevenue,
        Category::Bridges,
        Category::SocialSentiment,
        Category::SentimentCoin,
        Category::News,
        Category::WhaleTransactions,
        Category::ExchangeFlows,
        Category::GasPrices,
        Category::BlockchainStats,
        Category::NftCollections,
        Category::NftStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MarketOverview => "market_overview",
            Category::HistoricalPrices => "historical_prices",
            Category::TechnicalIndicators => "technical_indicators",
            Category::OrderBook => "order_book",
            Category::RecentTrades => "recent_trades",
            Category::Ticker24h => "ticker_24h",
            Category::GainersLosers => "gainers_losers",
            Category::Trending => "trending",
            Category::GlobalStats => "global_stats",
            Category::Dominance => "dominance",
            Category::CoinCategories => "coin_categories",
            Category::Exchanges => "exchanges",
            Category::Derivatives => "derivatives",
            Category::FundingRates => "funding_rates",
            Category::OpenInterest => "open_interest",
            Category::CoinDetails => "coin_details",
            Category::FearGreed => "fear_greed",
            Category::DefiProtocols => "defi_protocols",
            Category::ChainTvl => "chain_tvl",
            Category::Yields => "yields",
            Category::Stablecoins => "stablecoins",
            Category::DexVolumes => "dex_volumes",
            Category::FeesRevenue => "fees_revenue",
            Category::Bridges => "bridges",
            Category::SocialSentiment => "social_sentiment",
            Category::SentimentCoin => "sentiment_coin",
            Category::News => "news",
            Category::WhaleTransactions => "whale_transactions",
            Category::ExchangeFlows => "exchange_flows",
            Category::GasPrices => "gas_prices",
            Category::BlockchainStats => "blockchain_stats",
            Category::NftCollections => "nft_collections",
            Category::NftStats => "nft_stats",
        }
    }

    pub fn group(&self) -> CategoryGroup {
        match self {
            Category::FearGreed => CategoryGroup::Index,
            Category::DefiProtocols
            | Category::ChainTvl
            | Category::Yields
            | Category::Stablecoins
            | Category::DexVolumes
            | Category::FeesRevenue
            | Category::Bridges => CategoryGroup::Defi,
            Category::SocialSentiment | Category::SentimentCoin | Category::News => CategoryGroup::Social,
            Category::WhaleTransactions
            | Category::ExchangeFlows
            | Category::GasPrices
            | Category::BlockchainStats => CategoryGroup::Whale,
            Category::NftCollections | Category::NftStats => CategoryGroup::Nft,
            _ => CategoryGroup::Market,
        }
    }

    /// Every id, in catalogue order (used in 400 bodies)
    pub fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}
