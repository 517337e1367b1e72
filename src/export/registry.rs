//! Category registry
//!
//! One [`CategoryHandler`] per [`Category`]: where the data comes from, how
//! it is fetched and shaped, and what the download is called. The table is
//! built once at startup.

use super::category::Category;
use super::request::{ExportRequest, RankType};
use super::{shaping, Row};
use crate::error::Result;
use crate::providers::types::{MarketQuery, MoverKind};
use crate::providers::{MarketCache, MarketDataProvider};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum age of a cached market snapshot
pub const MARKET_CACHE_MAX_AGE: Duration = Duration::from_secs(300);

/// Largest `coin_markets` page the provider serves
pub const MARKET_PAGE_SIZE: u32 = 250;

/// Minimum USD value for whale transactions
const WHALE_MIN_VALUE_USD: u64 = 500_000;

/// Upstream access for fetchers
#[derive(Clone)]
pub struct ExportSources {
    pub provider: Arc<dyn MarketDataProvider>,
    pub cache: Option<Arc<dyn MarketCache>>,
}

pub type FetchFn = for<'a> fn(&'a ExportSources, &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>>;

/// Filename stem builder; receives the request and today's `YYYY-MM-DD`
pub type FilenameFn = fn(&ExportRequest, &str) -> String;

#[derive(Clone, Copy)]
pub struct CategoryHandler {
    pub category: Category,
    /// Attribution written into metadata
    pub source: &'static str,
    pub fetch: FetchFn,
    pub filename: FilenameFn,
}

pub struct CategoryRegistry {
    handlers: HashMap<Category, CategoryHandler>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        let handlers = handler_table()
            .into_iter()
            .map(|handler| (handler.category, handler))
            .collect();
        Self { handlers }
    }

    pub fn get(&self, category: Category) -> Option<&CategoryHandler> {
        self.handlers.get(&category)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn dated(request: &ExportRequest, date: &str) -> String {
    format!("{}_{}", request.category.as_str(), date)
}

fn symbol_interval(request: &ExportRequest, _date: &str) -> String {
    format!("{}_{}_{}", request.category.as_str(), request.symbol, request.interval.as_str())
}

fn symbol_dated(request: &ExportRequest, date: &str) -> String {
    format!("{}_{}_{}", request.category.as_str(), request.symbol, date)
}

fn order_book_name(request: &ExportRequest, _date: &str) -> String {
    format!("order_book_{}_{}", request.symbol, request.depth.levels())
}

fn movers_name(request: &ExportRequest, date: &str) -> String {
    format!("gainers_losers_{}_{}", request.rank_type.as_str(), date)
}

fn handler(category: Category, source: &'static str, fetch: FetchFn, filename: FilenameFn) -> CategoryHandler {
    CategoryHandler {
        category,
        source,
        fetch,
        filename,
    }
}

fn handler_table() -> Vec<CategoryHandler> {
    use Category::*;

    vec![
        handler(MarketOverview, "CoinGecko", fetch_market_overview, dated),
        handler(HistoricalPrices, "Binance", fetch_historical_prices, symbol_interval),
        handler(TechnicalIndicators, "Binance", fetch_technical_indicators, symbol_interval),
        handler(OrderBook, "Binance", fetch_order_book, order_book_name),
        handler(RecentTrades, "Binance", fetch_recent_trades, symbol_dated),
        handler(Ticker24h, "Binance", fetch_ticker_24h, dated),
        handler(GainersLosers, "CoinGecko", fetch_gainers_losers, movers_name),
        handler(Trending, "CoinGecko", fetch_trending, dated),
        handler(GlobalStats, "CoinGecko", fetch_global_stats, dated),
        handler(Dominance, "CoinGecko", fetch_dominance, dated),
        handler(CoinCategories, "CoinGecko", fetch_coin_categories, dated),
        handler(Exchanges, "CoinGecko", fetch_exchanges, dated),
        handler(Derivatives, "CoinGecko", fetch_derivatives, dated),
        handler(FundingRates, "Binance Futures", fetch_funding_rates, dated),
        handler(OpenInterest, "Binance Futures", fetch_open_interest, dated),
        handler(CoinDetails, "CoinGecko", fetch_coin_details, dated),
        handler(FearGreed, "Alternative.me", fetch_fear_greed, dated),
        handler(DefiProtocols, "DeFiLlama", fetch_defi_protocols, dated),
        handler(ChainTvl, "DeFiLlama", fetch_chain_tvl, dated),
        handler(Yields, "DeFiLlama", fetch_yields, dated),
        handler(Stablecoins, "DeFiLlama", fetch_stablecoins, dated),
        handler(DexVolumes, "DeFiLlama", fetch_dex_volumes, dated),
        handler(FeesRevenue, "DeFiLlama", fetch_fees_revenue, dated),
        handler(Bridges, "DeFiLlama", fetch_bridges, dated),
        handler(SocialSentiment, "LunarCrush", fetch_social_sentiment, dated),
        handler(SentimentCoin, "LunarCrush", fetch_sentiment_coin, symbol_dated),
        handler(News, "CryptoPanic", fetch_news, dated),
        handler(WhaleTransactions, "Whale Alert", fetch_whale_transactions, dated),
        handler(ExchangeFlows, "Whale Alert", fetch_exchange_flows, dated),
        handler(GasPrices, "Etherscan", fetch_gas_prices, dated),
        handler(BlockchainStats, "Blockchain.com", fetch_blockchain_stats, dated),
        handler(NftCollections, "CoinGecko", fetch_nft_collections, dated),
        handler(NftStats, "CoinGecko", fetch_nft_stats, dated),
    ]
}

fn truncated<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    items.truncate(limit);
    items
}

// ============================================================================
// Fetchers
// ============================================================================

/// Cached snapshot first, then the provider. Only the unfiltered top page
/// is cached; `coinCategory` and `symbols` requests always go upstream.
fn fetch_market_overview<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let cacheable = req.coin_category.is_none() && req.symbols.is_empty();
        let cache = src.cache.as_ref().filter(|_| cacheable);

        if let Some(cache) = cache {
            match cache.load_markets(MARKET_CACHE_MAX_AGE).await {
                Ok(markets) if !markets.is_empty() => {
                    debug!("market_overview served from cache ({} coins)", markets.len());
                    return Ok(shaping::market_overview(&shaping::filter_markets(markets, req)));
                }
                Ok(_) => debug!("market_overview cache miss"),
                Err(e) => warn!("market_overview cache lookup failed: {}", e),
            }
        }

        // A refill must hold the whole page, whatever this caller's limit
        let per_page = if cache.is_some() {
            MARKET_PAGE_SIZE
        } else {
            req.limit.clamp(1, MARKET_PAGE_SIZE as usize) as u32
        };
        let query = MarketQuery {
            category: req.coin_category.clone(),
            symbols: req.symbols.clone(),
            per_page,
        };
        let markets = src.provider.coin_markets(&query).await?;

        if let Some(cache) = cache {
            if !markets.is_empty() {
                if let Err(e) = cache.store_markets(&markets).await {
                    warn!("Failed to refresh market cache: {}", e);
                }
            }
        }

        Ok(shaping::market_overview(&shaping::filter_markets(markets, req)))
    }
    .boxed()
}

fn fetch_historical_prices<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let candles = src.provider.klines(&req.symbol, req.interval, req.limit).await?;
        Ok(shaping::historical_prices(&req.symbol, req.interval, &candles))
    }
    .boxed()
}

fn fetch_technical_indicators<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let candles = src.provider.klines(&req.symbol, req.interval, req.limit).await?;
        Ok(shaping::technical_indicators(&req.symbol, &candles))
    }
    .boxed()
}

fn fetch_order_book<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let book = src.provider.order_book(&req.symbol, req.depth).await?;
        Ok(shaping::order_book(&book))
    }
    .boxed()
}

fn fetch_recent_trades<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let trades = src.provider.recent_trades(&req.symbol, req.limit).await?;
        Ok(shaping::recent_trades(&req.symbol, &trades))
    }
    .boxed()
}

fn fetch_ticker_24h<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::ticker_24h(&src.provider.tickers_24h(&req.symbols).await?)) }.boxed()
}

fn fetch_gainers_losers<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let per_side = req.limit.min(100);
        let gainers = match req.rank_type {
            RankType::Both | RankType::Gainers => src.provider.top_movers(MoverKind::Gainers, per_side).await?,
            RankType::Losers => Vec::new(),
        };
        let losers = match req.rank_type {
            RankType::Both | RankType::Losers => src.provider.top_movers(MoverKind::Losers, per_side).await?,
            RankType::Gainers => Vec::new(),
        };
        Ok(shaping::gainers_losers(gainers, losers))
    }
    .boxed()
}

fn fetch_trending<'a>(src: &'a ExportSources, _req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::trending(&src.provider.trending().await?)) }.boxed()
}

fn fetch_global_stats<'a>(src: &'a ExportSources, _req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::global_stats(&src.provider.global_stats().await?)) }.boxed()
}

fn fetch_dominance<'a>(src: &'a ExportSources, _req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::dominance(&src.provider.global_stats().await?)) }.boxed()
}

fn fetch_coin_categories<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let categories = truncated(src.provider.coin_categories().await?, req.limit);
        Ok(shaping::coin_categories(&categories))
    }
    .boxed()
}

fn fetch_exchanges<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::exchanges(&src.provider.exchanges(req.limit).await?)) }.boxed()
}

fn fetch_derivatives<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::derivatives(&src.provider.derivatives(req.limit).await?)) }.boxed()
}

fn fetch_funding_rates<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::funding_rates(&src.provider.funding_rates(&req.symbols).await?)) }.boxed()
}

fn fetch_open_interest<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::open_interest(&src.provider.open_interest(&req.symbols).await?)) }.boxed()
}

fn fetch_coin_details<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let symbols = if req.symbols.is_empty() {
            vec![req.symbol.clone()]
        } else {
            req.symbols.clone()
        };
        Ok(shaping::coin_details(&src.provider.coin_details(&symbols).await?))
    }
    .boxed()
}

fn fetch_fear_greed<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::fear_greed(&src.provider.fear_greed(req.limit).await?)) }.boxed()
}

fn fetch_defi_protocols<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let protocols = truncated(src.provider.protocols().await?, req.limit);
        Ok(shaping::defi_protocols(&protocols))
    }
    .boxed()
}

/// Dominance is computed over every chain before the limit is applied
fn fetch_chain_tvl<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let rows = shaping::chain_tvl(&src.provider.chain_tvl().await?);
        Ok(truncated(rows, req.limit))
    }
    .boxed()
}

fn fetch_yields<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let mut pools = src.provider.yield_pools().await?;
        if let Some(chain) = &req.chain {
            pools.retain(|p| p.chain.eq_ignore_ascii_case(chain));
        }
        Ok(shaping::yields(&truncated(pools, req.limit)))
    }
    .boxed()
}

fn fetch_stablecoins<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::stablecoins(&truncated(src.provider.stablecoins().await?, req.limit))) }.boxed()
}

fn fetch_dex_volumes<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let volumes = truncated(src.provider.dex_volumes().await?, req.limit);
        Ok(shaping::protocol_activity(&volumes, "volume"))
    }
    .boxed()
}

fn fetch_fees_revenue<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let fees = truncated(src.provider.fees_revenue().await?, req.limit);
        Ok(shaping::protocol_activity(&fees, "fees"))
    }
    .boxed()
}

fn fetch_bridges<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::bridges(&truncated(src.provider.bridges().await?, req.limit))) }.boxed()
}

fn fetch_social_sentiment<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let mut metrics = src.provider.social_metrics(req.limit).await?;
        if !req.symbols.is_empty() {
            metrics.retain(|m| req.symbols.iter().any(|s| s.eq_ignore_ascii_case(&m.symbol)));
        }
        Ok(shaping::social_sentiment(&metrics))
    }
    .boxed()
}

fn fetch_sentiment_coin<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::sentiment_coin(&src.provider.coin_sentiment(&req.symbol).await?)) }.boxed()
}

fn fetch_news<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let articles = src.provider.news(req.news_filter, &req.symbols).await?;
        Ok(shaping::news(&truncated(articles, req.limit)))
    }
    .boxed()
}

fn fetch_whale_transactions<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let transactions = src.provider.whale_transactions(WHALE_MIN_VALUE_USD).await?;
        Ok(shaping::whale_transactions(&truncated(transactions, req.limit)))
    }
    .boxed()
}

fn fetch_exchange_flows<'a>(src: &'a ExportSources, _req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let transactions = src.provider.whale_transactions(WHALE_MIN_VALUE_USD).await?;
        Ok(shaping::exchange_flows(&transactions))
    }
    .boxed()
}

fn fetch_gas_prices<'a>(src: &'a ExportSources, _req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::gas_prices(&src.provider.gas_oracle().await?)) }.boxed()
}

fn fetch_blockchain_stats<'a>(src: &'a ExportSources, _req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move { Ok(shaping::blockchain_stats(&src.provider.blockchain_stats().await?)) }.boxed()
}

fn fetch_nft_collections<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let collections = src.provider.nft_collections(req.chain.as_deref(), req.limit).await?;
        Ok(shaping::nft_collections(&collections))
    }
    .boxed()
}

fn fetch_nft_stats<'a>(src: &'a ExportSources, req: &'a ExportRequest) -> BoxFuture<'a, Result<Vec<Row>>> {
    async move {
        let markets = src.provider.nft_markets(req.chain.as_deref(), req.limit).await?;
        Ok(shaping::nft_stats(&markets))
    }
    .boxed()
}
