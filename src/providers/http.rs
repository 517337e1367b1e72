//! HTTP implementation of [`MarketDataProvider`]
//!
//! Thin clients over the public REST APIs. Keyed providers (LunarCrush,
//! CryptoPanic, Whale Alert, Etherscan) fail with a configuration error when
//! their key is missing; the categories they back are feature gated anyway.

use super::types::*;
use super::MarketDataProvider;
use crate::config::ProviderKeys;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";
const COINGECKO_PRO_URL: &str = "https://pro-api.coingecko.com/api/v3";
const BINANCE_URL: &str = "https://api.binance.com/api/v3";
const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com/fapi/v1";
const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/";
const LLAMA_URL: &str = "https://api.llama.fi";
const LLAMA_YIELDS_URL: &str = "https://yields.llama.fi/pools";
const LLAMA_STABLECOINS_URL: &str = "https://stablecoins.llama.fi/stablecoins?includePrices=true";
const LLAMA_BRIDGES_URL: &str = "https://bridges.llama.fi/bridges";
const LUNARCRUSH_URL: &str = "https://lunarcrush.com/api4/public";
const CRYPTOPANIC_URL: &str = "https://cryptopanic.com/api/v1/posts/";
const WHALE_ALERT_URL: &str = "https://api.whale-alert.io/v1/transactions";
const ETHERSCAN_URL: &str = "https://api.etherscan.io/api";
const BLOCKCHAIN_STATS_URL: &str = "https://api.blockchain.info/stats";

/// Pairs used when a category needs symbols and the caller gave none
const DEFAULT_SYMBOLS: [&str; 5] = ["BTC", "ETH", "SOL", "BNB", "XRP"];

/// Whale Alert free tier only serves the last hour
const WHALE_WINDOW_SECS: i64 = 3600;

// ============================================================================
// Flexible number deserializers (Binance and Etherscan send numbers as strings)
// ============================================================================

fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleFloat {
        Float(f64),
        Int(i64),
        Str(String),
    }

    match FlexibleFloat::deserialize(deserializer)? {
        FlexibleFloat::Float(f) => Ok(f),
        FlexibleFloat::Int(i) => Ok(i as f64),
        FlexibleFloat::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn flexible_opt_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleOptFloat {
        Float(f64),
        Int(i64),
        Str(String),
    }

    match Option::<FlexibleOptFloat>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlexibleOptFloat::Float(f)) => Ok(Some(f)),
        Some(FlexibleOptFloat::Int(i)) => Ok(Some(i as f64)),
        Some(FlexibleOptFloat::Str(s)) if s.is_empty() => Ok(None),
        Some(FlexibleOptFloat::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Read a JSON number or numeric string
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    }
}

/// Exchange pair for a base symbol: `btc` -> `BTCUSDT`
fn usdt_pair(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if upper.ends_with("USDT") {
        upper
    } else {
        format!("{}USDT", upper)
    }
}

fn symbols_or_default(symbols: &[String]) -> Vec<String> {
    if symbols.is_empty() {
        DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
    } else {
        symbols.to_vec()
    }
}

// ============================================================================
// Client
// ============================================================================

/// Production provider backed by public REST APIs
pub struct HttpMarketData {
    client: Client,
    keys: ProviderKeys,
}

impl HttpMarketData {
    pub fn new(keys: ProviderKeys) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("cryptosheets/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, keys })
    }

    fn coingecko(&self, path: &str) -> RequestBuilder {
        match &self.keys.coingecko {
            Some(key) => self
                .client
                .get(format!("{}{}", COINGECKO_PRO_URL, path))
                .header("x-cg-pro-api-key", key),
            None => self.client.get(format!("{}{}", COINGECKO_URL, path)),
        }
    }

    fn required_key<'a>(key: &'a Option<String>, provider: &str) -> Result<&'a str> {
        key.as_deref()
            .ok_or_else(|| AppError::Config(format!("{} API key not configured", provider)))
    }

    /// Send a request and decode a JSON body, mapping non-2xx to an upstream error
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();

        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "{} returned HTTP {}",
                url.host_str().unwrap_or("provider"),
                status
            )));
        }

        debug!("Upstream {} -> {}", url.path(), status);
        Ok(response.json().await?)
    }

    async fn markets_page(
        &self,
        per_page: u32,
        category: Option<&str>,
        symbols: &[String],
    ) -> Result<Vec<CoinMarket>> {
        let mut params: Vec<(&str, String)> = vec![
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.clamp(1, 250).to_string()),
            ("page", "1".to_string()),
            ("price_change_percentage", "7d".to_string()),
        ];
        if let Some(category) = category {
            params.push(("category", category.to_string()));
        }
        if !symbols.is_empty() {
            let joined = symbols.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>().join(",");
            params.push(("symbols", joined));
        }

        self.fetch(self.coingecko("/coins/markets").query(&params)).await
    }

    async fn llama_overview(&self, kind: &str) -> Result<Vec<ProtocolActivity>> {
        #[derive(Deserialize)]
        struct Overview {
            #[serde(default)]
            protocols: Vec<OverviewProtocol>,
        }

        #[derive(Deserialize)]
        #[serde(default)]
        #[derive(Default)]
        struct OverviewProtocol {
            name: String,
            category: Option<String>,
            chains: Vec<String>,
            #[serde(rename = "total24h", deserialize_with = "flexible_opt_f64")]
            total_24h: Option<f64>,
            #[serde(rename = "total7d", deserialize_with = "flexible_opt_f64")]
            total_7d: Option<f64>,
            #[serde(rename = "total30d", deserialize_with = "flexible_opt_f64")]
            total_30d: Option<f64>,
            #[serde(deserialize_with = "flexible_opt_f64")]
            change_1d: Option<f64>,
        }

        let url = format!(
            "{}/overview/{}?excludeTotalDataChart=true&excludeTotalDataChartBreakdown=true",
            LLAMA_URL, kind
        );
        let overview: Overview = self.fetch(self.client.get(url)).await?;

        Ok(overview
            .protocols
            .into_iter()
            .map(|p| ProtocolActivity {
                name: p.name,
                category: p.category,
                chains: p.chains,
                total_24h: p.total_24h,
                total_7d: p.total_7d,
                total_30d: p.total_30d,
                change_1d: p.change_1d,
            })
            .collect())
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketData {
    async fn coin_markets(&self, query: &MarketQuery) -> Result<Vec<CoinMarket>> {
        self.markets_page(query.per_page, query.category.as_deref(), &query.symbols)
            .await
    }

    async fn top_movers(&self, kind: MoverKind, limit: usize) -> Result<Vec<CoinMarket>> {
        let mut markets: Vec<CoinMarket> = self
            .markets_page(250, None, &[])
            .await?
            .into_iter()
            .filter(|m| m.price_change_percentage_24h.is_some())
            .collect();

        let change = |m: &CoinMarket| m.price_change_percentage_24h.unwrap_or(0.0);
        match kind {
            MoverKind::Gainers => markets.sort_by(|a, b| change(b).total_cmp(&change(a))),
            MoverKind::Losers => markets.sort_by(|a, b| change(a).total_cmp(&change(b))),
        }
        markets.truncate(limit);
        Ok(markets)
    }

    async fn coin_details(&self, symbols: &[String]) -> Result<Vec<CoinMarket>> {
        self.markets_page(100, None, symbols).await
    }

    async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        #[derive(Deserialize)]
        struct Trending {
            coins: Vec<TrendingEntry>,
        }

        #[derive(Deserialize)]
        struct TrendingEntry {
            item: TrendingItem,
        }

        #[derive(Deserialize)]
        struct TrendingItem {
            id: String,
            name: String,
            symbol: String,
            market_cap_rank: Option<u32>,
            #[serde(default)]
            score: u32,
            price_btc: Option<f64>,
            #[serde(default)]
            data: Value,
        }

        let trending: Trending = self.fetch(self.coingecko("/search/trending")).await?;

        Ok(trending
            .coins
            .into_iter()
            .map(|entry| {
                let item = entry.item;
                TrendingCoin {
                    price_usd: number(&item.data["price"]),
                    price_change_percentage_24h: number(&item.data["price_change_percentage_24h"]["usd"]),
                    id: item.id,
                    name: item.name,
                    symbol: item.symbol,
                    market_cap_rank: item.market_cap_rank,
                    score: item.score,
                    price_btc: item.price_btc,
                }
            })
            .collect())
    }

    async fn global_stats(&self) -> Result<GlobalStats> {
        #[derive(Deserialize)]
        struct Global {
            data: GlobalData,
        }

        #[derive(Deserialize)]
        #[serde(default)]
        #[derive(Default)]
        struct GlobalData {
            active_cryptocurrencies: u64,
            markets: u64,
            total_market_cap: HashMap<String, f64>,
            total_volume: HashMap<String, f64>,
            market_cap_percentage: HashMap<String, f64>,
            market_cap_change_percentage_24h_usd: f64,
            updated_at: i64,
        }

        let global: Global = self.fetch(self.coingecko("/global")).await?;
        let data = global.data;

        let mut dominance: Vec<(String, f64)> = data
            .market_cap_percentage
            .into_iter()
            .map(|(symbol, pct)| (symbol.to_uppercase(), pct))
            .collect();
        dominance.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(GlobalStats {
            active_cryptocurrencies: data.active_cryptocurrencies,
            markets: data.markets,
            total_market_cap_usd: data.total_market_cap.get("usd").copied().unwrap_or(0.0),
            total_volume_usd: data.total_volume.get("usd").copied().unwrap_or(0.0),
            market_cap_change_percentage_24h_usd: data.market_cap_change_percentage_24h_usd,
            market_cap_percentage: dominance,
            updated_at: data.updated_at,
        })
    }

    async fn coin_categories(&self) -> Result<Vec<CoinCategory>> {
        self.fetch(self.coingecko("/coins/categories").query(&[("order", "market_cap_desc")]))
            .await
    }

    async fn exchanges(&self, limit: usize) -> Result<Vec<Exchange>> {
        let per_page = limit.clamp(1, 250).to_string();
        self.fetch(
            self.coingecko("/exchanges")
                .query(&[("per_page", per_page.as_str()), ("page", "1")]),
        )
        .await
    }

    async fn derivatives(&self, limit: usize) -> Result<Vec<DerivativeTicker>> {
        let mut tickers: Vec<DerivativeTicker> = self.fetch(self.coingecko("/derivatives")).await?;
        tickers.truncate(limit);
        Ok(tickers)
    }

    async fn klines(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        let pair = usdt_pair(symbol);
        let raw: Vec<Vec<Value>> = self
            .fetch(self.client.get(format!("{}/klines", BINANCE_URL)).query(&[
                ("symbol", pair.as_str()),
                ("interval", interval.as_str()),
                ("limit", &limit.clamp(1, 1000).to_string()),
            ]))
            .await?;

        raw.into_iter()
            .map(|k| {
                let field = |i: usize| k.get(i).and_then(number);
                Ok(Candle {
                    open_time: field(0).unwrap_or(0.0) as i64,
                    open: field(1).unwrap_or(0.0),
                    high: field(2).unwrap_or(0.0),
                    low: field(3).unwrap_or(0.0),
                    close: field(4).unwrap_or(0.0),
                    volume: field(5).unwrap_or(0.0),
                    close_time: field(6).unwrap_or(0.0) as i64,
                    quote_volume: field(7).unwrap_or(0.0),
                    trades: field(8).unwrap_or(0.0) as u64,
                })
            })
            .collect()
    }

    async fn order_book(&self, symbol: &str, depth: BookDepth) -> Result<OrderBook> {
        #[derive(Deserialize)]
        struct Depth {
            bids: Vec<[String; 2]>,
            asks: Vec<[String; 2]>,
        }

        let pair = usdt_pair(symbol);
        let depth_param = depth.levels().to_string();
        let raw: Depth = self
            .fetch(
                self.client
                    .get(format!("{}/depth", BINANCE_URL))
                    .query(&[("symbol", pair.as_str()), ("limit", depth_param.as_str())]),
            )
            .await?;

        let levels = |side: Vec<[String; 2]>| -> Vec<OrderLevel> {
            side.into_iter()
                .filter_map(|[price, qty]| {
                    Some(OrderLevel {
                        price: price.parse().ok()?,
                        quantity: qty.parse().ok()?,
                    })
                })
                .collect()
        };

        Ok(OrderBook::from_levels(&pair, levels(raw.bids), levels(raw.asks)))
    }

    async fn recent_trades(&self, symbol: &str, limit: usize) -> Result<Vec<Trade>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawTrade {
            id: u64,
            #[serde(deserialize_with = "flexible_f64")]
            price: f64,
            #[serde(deserialize_with = "flexible_f64")]
            qty: f64,
            #[serde(deserialize_with = "flexible_f64")]
            quote_qty: f64,
            time: i64,
            is_buyer_maker: bool,
        }

        let pair = usdt_pair(symbol);
        let limit_param = limit.clamp(1, 1000).to_string();
        let raw: Vec<RawTrade> = self
            .fetch(
                self.client
                    .get(format!("{}/trades", BINANCE_URL))
                    .query(&[("symbol", pair.as_str()), ("limit", limit_param.as_str())]),
            )
            .await?;

        Ok(raw
            .into_iter()
            .map(|t| Trade {
                id: t.id,
                price: t.price,
                quantity: t.qty,
                quote_quantity: t.quote_qty,
                time: t.time,
                is_buyer_maker: t.is_buyer_maker,
            })
            .collect())
    }

    async fn tickers_24h(&self, symbols: &[String]) -> Result<Vec<Ticker24h>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawTicker {
            symbol: String,
            #[serde(deserialize_with = "flexible_f64")]
            last_price: f64,
            #[serde(deserialize_with = "flexible_f64")]
            price_change: f64,
            #[serde(deserialize_with = "flexible_f64")]
            price_change_percent: f64,
            #[serde(deserialize_with = "flexible_f64")]
            high_price: f64,
            #[serde(deserialize_with = "flexible_f64")]
            low_price: f64,
            #[serde(deserialize_with = "flexible_f64")]
            volume: f64,
            #[serde(deserialize_with = "flexible_f64")]
            quote_volume: f64,
            count: u64,
        }

        let pairs: Vec<String> = symbols_or_default(symbols).iter().map(|s| usdt_pair(s)).collect();
        let symbols_param = serde_json::to_string(&pairs)?;
        let raw: Vec<RawTicker> = self
            .fetch(
                self.client
                    .get(format!("{}/ticker/24hr", BINANCE_URL))
                    .query(&[("symbols", symbols_param.as_str())]),
            )
            .await?;

        Ok(raw
            .into_iter()
            .map(|t| Ticker24h {
                symbol: t.symbol,
                last_price: t.last_price,
                price_change: t.price_change,
                price_change_percent: t.price_change_percent,
                high_price: t.high_price,
                low_price: t.low_price,
                volume: t.volume,
                quote_volume: t.quote_volume,
                trade_count: t.count,
            })
            .collect())
    }

    async fn funding_rates(&self, symbols: &[String]) -> Result<Vec<FundingRate>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PremiumIndex {
            symbol: String,
            #[serde(deserialize_with = "flexible_f64")]
            mark_price: f64,
            #[serde(deserialize_with = "flexible_f64")]
            index_price: f64,
            #[serde(deserialize_with = "flexible_f64")]
            last_funding_rate: f64,
            next_funding_time: i64,
        }

        let raw: Vec<PremiumIndex> = self
            .fetch(self.client.get(format!("{}/premiumIndex", BINANCE_FUTURES_URL)))
            .await?;

        let wanted: Vec<String> = symbols_or_default(symbols).iter().map(|s| usdt_pair(s)).collect();

        Ok(raw
            .into_iter()
            .filter(|p| wanted.contains(&p.symbol))
            .map(|p| FundingRate {
                symbol: p.symbol,
                mark_price: p.mark_price,
                index_price: p.index_price,
                funding_rate: p.last_funding_rate,
                next_funding_time: p.next_funding_time,
            })
            .collect())
    }

    async fn open_interest(&self, symbols: &[String]) -> Result<Vec<OpenInterest>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawOpenInterest {
            symbol: String,
            #[serde(deserialize_with = "flexible_f64")]
            open_interest: f64,
            time: i64,
        }

        let mut result = Vec::new();
        for symbol in symbols_or_default(symbols) {
            let pair = usdt_pair(&symbol);
            let raw: RawOpenInterest = self
                .fetch(
                    self.client
                        .get(format!("{}/openInterest", BINANCE_FUTURES_URL))
                        .query(&[("symbol", pair.as_str())]),
                )
                .await?;
            result.push(OpenInterest {
                symbol: raw.symbol,
                open_interest: raw.open_interest,
                time: raw.time,
            });
        }
        Ok(result)
    }

    async fn fear_greed(&self, limit: usize) -> Result<Vec<FearGreedEntry>> {
        #[derive(Deserialize)]
        struct FearGreed {
            data: Vec<RawEntry>,
        }

        #[derive(Deserialize)]
        struct RawEntry {
            #[serde(deserialize_with = "flexible_f64")]
            value: f64,
            value_classification: String,
            #[serde(deserialize_with = "flexible_f64")]
            timestamp: f64,
        }

        let limit_param = limit.to_string();
        let raw: FearGreed = self
            .fetch(self.client.get(FEAR_GREED_URL).query(&[("limit", limit_param.as_str())]))
            .await?;

        Ok(raw
            .data
            .into_iter()
            .map(|e| FearGreedEntry {
                value: e.value as u32,
                classification: e.value_classification,
                timestamp: e.timestamp as i64,
            })
            .collect())
    }

    async fn protocols(&self) -> Result<Vec<Protocol>> {
        self.fetch(self.client.get(format!("{}/protocols", LLAMA_URL))).await
    }

    async fn chain_tvl(&self) -> Result<Vec<ChainTvl>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawChain {
            name: String,
            token_symbol: Option<String>,
            #[serde(default)]
            tvl: f64,
        }

        let raw: Vec<RawChain> = self.fetch(self.client.get(format!("{}/v2/chains", LLAMA_URL))).await?;
        Ok(raw
            .into_iter()
            .map(|c| ChainTvl {
                name: c.name,
                token_symbol: c.token_symbol,
                tvl: c.tvl,
            })
            .collect())
    }

    async fn yield_pools(&self) -> Result<Vec<YieldPool>> {
        #[derive(Deserialize)]
        struct Pools {
            data: Vec<RawPool>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawPool {
            pool: String,
            chain: String,
            project: String,
            symbol: String,
            tvl_usd: Option<f64>,
            apy: Option<f64>,
            apy_base: Option<f64>,
            apy_reward: Option<f64>,
            #[serde(default)]
            stablecoin: bool,
        }

        let raw: Pools = self.fetch(self.client.get(LLAMA_YIELDS_URL)).await?;
        Ok(raw
            .data
            .into_iter()
            .map(|p| YieldPool {
                pool: p.pool,
                chain: p.chain,
                project: p.project,
                symbol: p.symbol,
                tvl_usd: p.tvl_usd,
                apy: p.apy,
                apy_base: p.apy_base,
                apy_reward: p.apy_reward,
                stablecoin: p.stablecoin,
            })
            .collect())
    }

    async fn stablecoins(&self) -> Result<Vec<Stablecoin>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Stablecoins {
            pegged_assets: Vec<RawStablecoin>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawStablecoin {
            name: String,
            symbol: String,
            peg_type: Option<String>,
            peg_mechanism: Option<String>,
            #[serde(default)]
            circulating: HashMap<String, f64>,
            #[serde(default, deserialize_with = "flexible_opt_f64")]
            price: Option<f64>,
            #[serde(default)]
            chains: Vec<String>,
        }

        let raw: Stablecoins = self.fetch(self.client.get(LLAMA_STABLECOINS_URL)).await?;
        Ok(raw
            .pegged_assets
            .into_iter()
            .map(|s| Stablecoin {
                circulating_usd: s.circulating.get("peggedUSD").copied(),
                name: s.name,
                symbol: s.symbol,
                peg_type: s.peg_type,
                peg_mechanism: s.peg_mechanism,
                price: s.price,
                chains: s.chains,
            })
            .collect())
    }

    async fn dex_volumes(&self) -> Result<Vec<ProtocolActivity>> {
        self.llama_overview("dexs").await
    }

    async fn fees_revenue(&self) -> Result<Vec<ProtocolActivity>> {
        self.llama_overview("fees").await
    }

    async fn bridges(&self) -> Result<Vec<Bridge>> {
        #[derive(Deserialize)]
        struct Bridges {
            bridges: Vec<RawBridge>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawBridge {
            name: String,
            display_name: String,
            volume_prev_day: Option<f64>,
            volume_prev2_day: Option<f64>,
            #[serde(default)]
            chains: Vec<String>,
        }

        let raw: Bridges = self.fetch(self.client.get(LLAMA_BRIDGES_URL)).await?;
        Ok(raw
            .bridges
            .into_iter()
            .map(|b| Bridge {
                name: b.name,
                display_name: b.display_name,
                volume_prev_day: b.volume_prev_day,
                volume_prev_2_day: b.volume_prev2_day,
                chains: b.chains,
            })
            .collect())
    }

    async fn social_metrics(&self, limit: usize) -> Result<Vec<SocialMetric>> {
        #[derive(Deserialize)]
        struct CoinList {
            data: Vec<SocialMetric>,
        }

        let key = Self::required_key(&self.keys.lunarcrush, "LunarCrush")?;
        let limit_param = limit.to_string();
        let raw: CoinList = self
            .fetch(
                self.client
                    .get(format!("{}/coins/list/v2", LUNARCRUSH_URL))
                    .bearer_auth(key)
                    .query(&[("sort", "galaxy_score"), ("limit", limit_param.as_str())]),
            )
            .await?;
        Ok(raw.data)
    }

    async fn coin_sentiment(&self, symbol: &str) -> Result<CoinSentiment> {
        #[derive(Deserialize)]
        struct CoinSummary {
            data: SocialMetric,
        }

        #[derive(Deserialize)]
        struct Posts {
            #[serde(default)]
            data: Vec<RawPost>,
        }

        #[derive(Deserialize)]
        struct RawPost {
            #[serde(default)]
            post_title: String,
            post_link: Option<String>,
            creator_display_name: Option<String>,
            post_type: Option<String>,
            interactions_total: Option<f64>,
            post_sentiment: Option<f64>,
            post_created: Option<i64>,
        }

        let key = Self::required_key(&self.keys.lunarcrush, "LunarCrush")?;
        let symbol = symbol.trim().to_uppercase();

        let summary: CoinSummary = self
            .fetch(
                self.client
                    .get(format!("{}/coins/{}/v1", LUNARCRUSH_URL, symbol))
                    .bearer_auth(key),
            )
            .await?;

        let posts: Posts = self
            .fetch(
                self.client
                    .get(format!("{}/topic/{}/posts/v1", LUNARCRUSH_URL, symbol.to_lowercase()))
                    .bearer_auth(key),
            )
            .await?;

        Ok(CoinSentiment {
            summary: summary.data,
            posts: posts
                .data
                .into_iter()
                .map(|p| SocialPost {
                    title: p.post_title,
                    url: p.post_link,
                    creator: p.creator_display_name,
                    network: p.post_type,
                    interactions: p.interactions_total,
                    sentiment: p.post_sentiment,
                    created_at: p.post_created,
                })
                .collect(),
        })
    }

    async fn news(&self, filter: Option<NewsFilter>, symbols: &[String]) -> Result<Vec<NewsArticle>> {
        #[derive(Deserialize)]
        struct Posts {
            results: Vec<RawArticle>,
        }

        #[derive(Deserialize)]
        struct RawArticle {
            title: String,
            url: String,
            source: Option<RawSource>,
            published_at: Option<String>,
            #[serde(default)]
            currencies: Vec<RawCurrency>,
            #[serde(default)]
            votes: RawVotes,
            kind: Option<String>,
        }

        #[derive(Deserialize)]
        struct RawSource {
            title: String,
        }

        #[derive(Deserialize)]
        struct RawCurrency {
            code: String,
        }

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct RawVotes {
            positive: u32,
            negative: u32,
        }

        let key = Self::required_key(&self.keys.cryptopanic, "CryptoPanic")?;
        let mut params: Vec<(&str, String)> = vec![
            ("auth_token", key.to_string()),
            ("public", "true".to_string()),
        ];
        if let Some(filter) = filter {
            params.push(("filter", filter.as_str().to_string()));
        }
        if !symbols.is_empty() {
            params.push(("currencies", symbols.join(",")));
        }

        let raw: Posts = self.fetch(self.client.get(CRYPTOPANIC_URL).query(&params)).await?;
        Ok(raw
            .results
            .into_iter()
            .map(|a| NewsArticle {
                title: a.title,
                url: a.url,
                source: a.source.map(|s| s.title),
                published_at: a.published_at,
                currencies: a.currencies.into_iter().map(|c| c.code).collect(),
                votes_positive: a.votes.positive,
                votes_negative: a.votes.negative,
                kind: a.kind,
            })
            .collect())
    }

    async fn whale_transactions(&self, min_value_usd: u64) -> Result<Vec<WhaleTransaction>> {
        #[derive(Deserialize)]
        struct Transactions {
            #[serde(default)]
            transactions: Vec<RawTransaction>,
        }

        #[derive(Deserialize)]
        struct RawTransaction {
            blockchain: String,
            symbol: String,
            hash: String,
            timestamp: i64,
            amount: f64,
            amount_usd: f64,
            from: Option<RawParty>,
            to: Option<RawParty>,
            transaction_type: Option<String>,
        }

        #[derive(Deserialize)]
        struct RawParty {
            owner: Option<String>,
            owner_type: Option<String>,
        }

        let key = Self::required_key(&self.keys.whale_alert, "Whale Alert")?;
        let start = (chrono::Utc::now().timestamp() - WHALE_WINDOW_SECS).to_string();
        let min_value = min_value_usd.to_string();
        let raw: Transactions = self
            .fetch(self.client.get(WHALE_ALERT_URL).query(&[
                ("api_key", key),
                ("min_value", min_value.as_str()),
                ("start", start.as_str()),
            ]))
            .await?;

        Ok(raw
            .transactions
            .into_iter()
            .map(|t| {
                let (from_owner, from_owner_type) =
                    t.from.map(|p| (p.owner, p.owner_type)).unwrap_or((None, None));
                let (to_owner, to_owner_type) =
                    t.to.map(|p| (p.owner, p.owner_type)).unwrap_or((None, None));
                WhaleTransaction {
                    blockchain: t.blockchain,
                    symbol: t.symbol.to_uppercase(),
                    hash: t.hash,
                    timestamp: t.timestamp,
                    amount: t.amount,
                    amount_usd: t.amount_usd,
                    from_owner,
                    from_owner_type,
                    to_owner,
                    to_owner_type,
                    transaction_type: t.transaction_type,
                }
            })
            .collect())
    }

    async fn gas_oracle(&self) -> Result<GasOracle> {
        #[derive(Deserialize)]
        struct Oracle {
            status: String,
            result: Value,
        }

        #[derive(Deserialize)]
        #[allow(non_snake_case)]
        struct RawGas {
            #[serde(deserialize_with = "flexible_f64")]
            LastBlock: f64,
            #[serde(deserialize_with = "flexible_f64")]
            SafeGasPrice: f64,
            #[serde(deserialize_with = "flexible_f64")]
            ProposeGasPrice: f64,
            #[serde(deserialize_with = "flexible_f64")]
            FastGasPrice: f64,
            #[serde(default, deserialize_with = "flexible_opt_f64")]
            suggestBaseFee: Option<f64>,
        }

        let key = Self::required_key(&self.keys.etherscan, "Etherscan")?;
        let raw: Oracle = self
            .fetch(self.client.get(ETHERSCAN_URL).query(&[
                ("module", "gastracker"),
                ("action", "gasoracle"),
                ("apikey", key),
            ]))
            .await?;

        if raw.status != "1" {
            return Err(AppError::Upstream(format!("Etherscan gas oracle error: {}", raw.result)));
        }

        let gas: RawGas = serde_json::from_value(raw.result)?;
        Ok(GasOracle {
            last_block: gas.LastBlock as u64,
            safe_gwei: gas.SafeGasPrice,
            propose_gwei: gas.ProposeGasPrice,
            fast_gwei: gas.FastGasPrice,
            base_fee_gwei: gas.suggestBaseFee,
        })
    }

    async fn blockchain_stats(&self) -> Result<BlockchainStats> {
        #[derive(Deserialize)]
        #[serde(default)]
        #[derive(Default)]
        struct RawStats {
            market_price_usd: f64,
            hash_rate: f64,
            difficulty: f64,
            n_blocks_mined: u64,
            minutes_between_blocks: f64,
            n_tx: u64,
            total_fees_btc: f64,
            estimated_transaction_volume_usd: f64,
            timestamp: f64,
        }

        let raw: RawStats = self.fetch(self.client.get(BLOCKCHAIN_STATS_URL)).await?;
        Ok(BlockchainStats {
            market_price_usd: raw.market_price_usd,
            hash_rate: raw.hash_rate,
            difficulty: raw.difficulty,
            blocks_mined_24h: raw.n_blocks_mined,
            minutes_between_blocks: raw.minutes_between_blocks,
            transactions_24h: raw.n_tx,
            // reported in satoshi
            total_fees_btc: raw.total_fees_btc / 100_000_000.0,
            estimated_transaction_volume_usd: raw.estimated_transaction_volume_usd,
            timestamp: raw.timestamp as i64,
        })
    }

    async fn nft_collections(&self, chain: Option<&str>, limit: usize) -> Result<Vec<NftCollection>> {
        let per_page = limit.clamp(1, 250).to_string();
        let collections: Vec<NftCollection> = self
            .fetch(
                self.coingecko("/nfts/list")
                    .query(&[("per_page", per_page.as_str()), ("page", "1")]),
            )
            .await?;

        Ok(match chain {
            Some(chain) => collections
                .into_iter()
                .filter(|c| c.asset_platform_id.as_deref() == Some(chain))
                .collect(),
            None => collections,
        })
    }

    async fn nft_markets(&self, chain: Option<&str>, limit: usize) -> Result<Vec<NftMarket>> {
        #[derive(Deserialize)]
        struct RawNftMarket {
            id: String,
            name: String,
            symbol: Option<String>,
            asset_platform_id: Option<String>,
            #[serde(default)]
            floor_price: HashMap<String, f64>,
            #[serde(default)]
            market_cap: HashMap<String, f64>,
            #[serde(default)]
            volume_24h: HashMap<String, f64>,
            floor_price_in_usd_24h_percentage_change: Option<f64>,
            number_of_unique_addresses: Option<u64>,
            total_supply: Option<f64>,
        }

        let per_page = limit.clamp(1, 250).to_string();
        let mut params = vec![
            ("order", "market_cap_usd_desc"),
            ("per_page", per_page.as_str()),
            ("page", "1"),
        ];
        if let Some(chain) = chain {
            params.push(("asset_platform_id", chain));
        }

        let raw: Vec<RawNftMarket> = self.fetch(self.coingecko("/nfts/markets").query(&params)).await?;
        Ok(raw
            .into_iter()
            .map(|n| NftMarket {
                floor_price_usd: n.floor_price.get("usd").copied(),
                market_cap_usd: n.market_cap.get("usd").copied(),
                volume_24h_usd: n.volume_24h.get("usd").copied(),
                id: n.id,
                name: n.name,
                symbol: n.symbol,
                asset_platform_id: n.asset_platform_id,
                floor_price_change_24h: n.floor_price_in_usd_24h_percentage_change,
                owners: n.number_of_unique_addresses,
                total_supply: n.total_supply.map(|s| s as u64),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usdt_pair() {
        assert_eq!(usdt_pair("btc"), "BTCUSDT");
        assert_eq!(usdt_pair("ETHUSDT"), "ETHUSDT");
    }

    #[test]
    fn test_number_accepts_strings() {
        assert_eq!(number(&serde_json::json!("$1,234.5")), Some(1234.5));
        assert_eq!(number(&serde_json::json!(42)), Some(42.0));
        assert_eq!(number(&Value::Null), None);
    }

    #[test]
    fn test_flexible_deserializers() {
        #[derive(Deserialize)]
        struct Sample {
            #[serde(deserialize_with = "flexible_f64")]
            a: f64,
            #[serde(default, deserialize_with = "flexible_opt_f64")]
            b: Option<f64>,
        }

        let s: Sample = serde_json::from_str(r#"{"a":"1.5","b":""}"#).unwrap();
        assert_eq!(s.a, 1.5);
        assert!(s.b.is_none());

        let s: Sample = serde_json::from_str(r#"{"a":2}"#).unwrap();
        assert_eq!(s.a, 2.0);
        assert!(s.b.is_none());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = HttpMarketData::required_key(&None, "Etherscan").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_default_symbols() {
        assert_eq!(symbols_or_default(&[]).len(), 5);
        assert_eq!(symbols_or_default(&["DOGE".to_string()]), vec!["DOGE".to_string()]);
    }
}
