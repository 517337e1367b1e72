//! Deterministic in-process provider for tests

use super::types::*;
use super::{MarketCache, MarketDataProvider};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Provider returning canned data and counting upstream calls
#[derive(Default)]
pub struct FixtureProvider {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of provider methods invoked so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with an upstream error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn hit(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("fixture provider offline".to_string()));
        }
        Ok(())
    }
}

/// Twelve coins so preview truncation has something to cut
pub fn sample_markets() -> Vec<CoinMarket> {
    let coins = [
        ("bitcoin", "btc", "Bitcoin", 65000.0, 1_280_000_000_000.0, 2.5),
        ("ethereum", "eth", "Ethereum", 3200.0, 385_000_000_000.0, -1.2),
        ("tether", "usdt", "Tether", 1.0, 110_000_000_000.0, 0.01),
        ("solana", "sol", "Solana", 150.0, 68_000_000_000.0, 6.3),
        ("binancecoin", "bnb", "BNB", 580.0, 85_000_000_000.0, 0.4),
        ("ripple", "xrp", "XRP", 0.52, 29_000_000_000.0, -3.1),
        ("cardano", "ada", "Cardano", 0.45, 16_000_000_000.0, 1.1),
        ("dogecoin", "doge", "Dogecoin", 0.16, 23_000_000_000.0, 9.8),
        ("tron", "trx", "TRON", 0.12, 10_500_000_000.0, -0.6),
        ("avalanche-2", "avax", "Avalanche", 35.0, 13_000_000_000.0, -4.4),
        ("chainlink", "link", "Chainlink", 14.0, 8_200_000_000.0, 2.0),
        ("polkadot", "dot", "Polkadot", 7.1, 9_800_000_000.0, -2.7),
    ];

    coins
        .iter()
        .enumerate()
        .map(|(i, (id, symbol, name, price, cap, change))| CoinMarket {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            current_price: Some(*price),
            market_cap: Some(*cap),
            market_cap_rank: Some(i as u32 + 1),
            total_volume: Some(cap / 40.0),
            high_24h: Some(price * 1.02),
            low_24h: Some(price * 0.97),
            price_change_24h: Some(price * change / 100.0),
            price_change_percentage_24h: Some(*change),
            price_change_percentage_7d_in_currency: Some(change * 2.0),
            circulating_supply: Some(cap / price),
            total_supply: Some(cap / price * 1.1),
            max_supply: None,
            ath: Some(price * 1.5),
            ath_change_percentage: Some(-33.3),
            ath_date: Some("2021-11-10T14:24:11.849Z".to_string()),
            atl: Some(price * 0.01),
            atl_date: Some("2015-01-14T00:00:00.000Z".to_string()),
            last_updated: Some("2024-06-01T00:00:00.000Z".to_string()),
        })
        .collect()
}

/// Rising closes so indicator windows fill deterministically
pub fn sample_candles(limit: usize) -> Vec<Candle> {
    (0..limit)
        .map(|i| {
            let close = 100.0 + i as f64;
            Candle {
                open_time: 1_700_000_000_000 + i as i64 * 86_400_000,
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0 + i as f64,
                close_time: 1_700_000_000_000 + (i as i64 + 1) * 86_400_000 - 1,
                quote_volume: close * 1000.0,
                trades: 500 + i as u64,
            }
        })
        .collect()
}

pub fn sample_whales() -> Vec<WhaleTransaction> {
    let tx = |hash: &str, amount_usd: f64, from: Option<&str>, to: Option<&str>| WhaleTransaction {
        blockchain: "bitcoin".to_string(),
        symbol: "BTC".to_string(),
        hash: hash.to_string(),
        timestamp: 1_717_000_000,
        amount: amount_usd / 65000.0,
        amount_usd,
        from_owner: from.map(str::to_string),
        from_owner_type: from.map(|_| "exchange".to_string()),
        to_owner: to.map(str::to_string),
        to_owner_type: to.map(|_| "exchange".to_string()),
        transaction_type: Some("transfer".to_string()),
    };

    vec![
        tx("a1", 5_000_000.0, None, Some("binance")),
        tx("a2", 2_000_000.0, Some("binance"), None),
        tx("a3", 9_000_000.0, Some("coinbase"), None),
        tx("a4", 1_000_000.0, None, None),
    ]
}

#[async_trait]
impl MarketDataProvider for FixtureProvider {
    async fn coin_markets(&self, query: &MarketQuery) -> Result<Vec<CoinMarket>> {
        self.hit()?;
        let mut markets = sample_markets();
        if !query.symbols.is_empty() {
            markets.retain(|m| query.symbols.iter().any(|s| s.eq_ignore_ascii_case(&m.symbol)));
        }
        markets.truncate(query.per_page.max(1) as usize);
        Ok(markets)
    }

    async fn top_movers(&self, kind: MoverKind, limit: usize) -> Result<Vec<CoinMarket>> {
        self.hit()?;
        let mut markets = sample_markets();
        match kind {
            MoverKind::Gainers => markets.retain(|m| m.price_change_percentage_24h.unwrap_or(0.0) > 0.0),
            MoverKind::Losers => markets.retain(|m| m.price_change_percentage_24h.unwrap_or(0.0) < 0.0),
        }
        markets.truncate(limit);
        Ok(markets)
    }

    async fn coin_details(&self, symbols: &[String]) -> Result<Vec<CoinMarket>> {
        self.hit()?;
        Ok(sample_markets()
            .into_iter()
            .filter(|m| symbols.is_empty() || symbols.iter().any(|s| s.eq_ignore_ascii_case(&m.symbol)))
            .collect())
    }

    async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        self.hit()?;
        Ok(vec![TrendingCoin {
            id: "pepe".to_string(),
            name: "Pepe".to_string(),
            symbol: "PEPE".to_string(),
            market_cap_rank: Some(24),
            score: 0,
            price_btc: Some(0.00000000017),
            price_usd: Some(0.000011),
            price_change_percentage_24h: Some(12.5),
        }])
    }

    async fn global_stats(&self) -> Result<GlobalStats> {
        self.hit()?;
        Ok(GlobalStats {
            active_cryptocurrencies: 14000,
            markets: 1100,
            total_market_cap_usd: 2_400_000_000_000.0,
            total_volume_usd: 90_000_000_000.0,
            market_cap_change_percentage_24h_usd: 1.4,
            market_cap_percentage: vec![("BTC".to_string(), 53.3), ("ETH".to_string(), 16.0)],
            updated_at: 1_717_000_000,
        })
    }

    async fn coin_categories(&self) -> Result<Vec<CoinCategory>> {
        self.hit()?;
        Ok(vec![CoinCategory {
            id: "layer-1".to_string(),
            name: "Layer 1 (L1)".to_string(),
            market_cap: Some(1_900_000_000_000.0),
            market_cap_change_24h: Some(1.2),
            volume_24h: Some(60_000_000_000.0),
            updated_at: Some("2024-06-01T00:00:00Z".to_string()),
        }])
    }

    async fn exchanges(&self, limit: usize) -> Result<Vec<Exchange>> {
        self.hit()?;
        let mut exchanges = vec![Exchange {
            id: "binance".to_string(),
            name: "Binance".to_string(),
            country: Some("Cayman Islands".to_string()),
            year_established: Some(2017),
            trust_score: Some(10),
            trust_score_rank: Some(1),
            trade_volume_24h_btc: Some(250_000.0),
            url: Some("https://www.binance.com/".to_string()),
        }];
        exchanges.truncate(limit);
        Ok(exchanges)
    }

    async fn derivatives(&self, limit: usize) -> Result<Vec<DerivativeTicker>> {
        self.hit()?;
        let mut tickers = vec![DerivativeTicker {
            market: "Binance (Futures)".to_string(),
            symbol: "BTCUSDT".to_string(),
            index_id: Some("BTC".to_string()),
            price: Some("65010.5".to_string()),
            price_percentage_change_24h: Some(2.4),
            contract_type: Some("perpetual".to_string()),
            funding_rate: Some(0.01),
            open_interest: Some(9_000_000_000.0),
            volume_24h: Some(20_000_000_000.0),
        }];
        tickers.truncate(limit);
        Ok(tickers)
    }

    async fn klines(&self, _symbol: &str, _interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        self.hit()?;
        Ok(sample_candles(limit.min(120)))
    }

    async fn order_book(&self, symbol: &str, _depth: BookDepth) -> Result<OrderBook> {
        self.hit()?;
        let level = |price: f64, quantity: f64| OrderLevel { price, quantity };
        Ok(OrderBook::from_levels(
            &format!("{}USDT", symbol.to_uppercase()),
            vec![level(99.0, 1.0), level(98.0, 2.0), level(97.0, 3.0)],
            vec![
                level(100.0, 1.0),
                level(101.0, 1.0),
                level(102.0, 1.0),
                level(103.0, 1.0),
                level(104.0, 1.0),
            ],
        ))
    }

    async fn recent_trades(&self, _symbol: &str, limit: usize) -> Result<Vec<Trade>> {
        self.hit()?;
        Ok((0..limit.min(20) as u64)
            .map(|i| Trade {
                id: 1000 + i,
                price: 65000.0 + i as f64,
                quantity: 0.01,
                quote_quantity: 650.0,
                time: 1_717_000_000_000 + i as i64,
                is_buyer_maker: i % 2 == 0,
            })
            .collect())
    }

    async fn tickers_24h(&self, symbols: &[String]) -> Result<Vec<Ticker24h>> {
        self.hit()?;
        let symbols = if symbols.is_empty() {
            vec!["BTC".to_string()]
        } else {
            symbols.to_vec()
        };
        Ok(symbols
            .iter()
            .map(|s| Ticker24h {
                symbol: format!("{}USDT", s.to_uppercase()),
                last_price: 100.0,
                price_change: 2.0,
                price_change_percent: 2.0,
                high_price: 105.0,
                low_price: 95.0,
                volume: 1000.0,
                quote_volume: 100_000.0,
                trade_count: 42,
            })
            .collect())
    }

    async fn funding_rates(&self, _symbols: &[String]) -> Result<Vec<FundingRate>> {
        self.hit()?;
        Ok(vec![FundingRate {
            symbol: "BTCUSDT".to_string(),
            mark_price: 65000.0,
            index_price: 64990.0,
            funding_rate: 0.0001,
            next_funding_time: 1_717_027_200_000,
        }])
    }

    async fn open_interest(&self, _symbols: &[String]) -> Result<Vec<OpenInterest>> {
        self.hit()?;
        Ok(vec![OpenInterest {
            symbol: "BTCUSDT".to_string(),
            open_interest: 80_000.0,
            time: 1_717_000_000_000,
        }])
    }

    async fn fear_greed(&self, limit: usize) -> Result<Vec<FearGreedEntry>> {
        self.hit()?;
        Ok((0..limit.min(30) as i64)
            .map(|i| FearGreedEntry {
                value: 40 + (i % 40) as u32,
                classification: "Greed".to_string(),
                timestamp: 1_717_000_000 - i * 86_400,
            })
            .collect())
    }

    async fn protocols(&self) -> Result<Vec<Protocol>> {
        self.hit()?;
        Ok(vec![Protocol {
            name: "Lido".to_string(),
            symbol: Some("LDO".to_string()),
            category: Some("Liquid Staking".to_string()),
            chains: vec!["Ethereum".to_string()],
            tvl: Some(30_000_000_000.0),
            change_1d: Some(0.5),
            change_7d: Some(2.0),
            mcap: Some(1_800_000_000.0),
        }])
    }

    async fn chain_tvl(&self) -> Result<Vec<ChainTvl>> {
        self.hit()?;
        Ok(vec![
            ChainTvl {
                name: "Ethereum".to_string(),
                token_symbol: Some("ETH".to_string()),
                tvl: 300.0,
            },
            ChainTvl {
                name: "Solana".to_string(),
                token_symbol: Some("SOL".to_string()),
                tvl: 100.0,
            },
        ])
    }

    async fn yield_pools(&self) -> Result<Vec<YieldPool>> {
        self.hit()?;
        Ok(vec![YieldPool {
            pool: "747c1d2a".to_string(),
            chain: "Ethereum".to_string(),
            project: "lido".to_string(),
            symbol: "STETH".to_string(),
            tvl_usd: Some(30_000_000_000.0),
            apy: Some(3.1),
            apy_base: Some(3.1),
            apy_reward: None,
            stablecoin: false,
        }])
    }

    async fn stablecoins(&self) -> Result<Vec<Stablecoin>> {
        self.hit()?;
        Ok(vec![Stablecoin {
            name: "Tether".to_string(),
            symbol: "USDT".to_string(),
            peg_type: Some("peggedUSD".to_string()),
            peg_mechanism: Some("fiat-backed".to_string()),
            circulating_usd: Some(110_000_000_000.0),
            price: Some(1.0),
            chains: vec!["Tron".to_string(), "Ethereum".to_string()],
        }])
    }

    async fn dex_volumes(&self) -> Result<Vec<ProtocolActivity>> {
        self.hit()?;
        Ok(vec![ProtocolActivity {
            name: "Uniswap V3".to_string(),
            category: Some("Dexes".to_string()),
            chains: vec!["Ethereum".to_string()],
            total_24h: Some(1_500_000_000.0),
            total_7d: Some(9_000_000_000.0),
            total_30d: None,
            change_1d: Some(4.2),
        }])
    }

    async fn fees_revenue(&self) -> Result<Vec<ProtocolActivity>> {
        self.dex_volumes().await
    }

    async fn bridges(&self) -> Result<Vec<Bridge>> {
        self.hit()?;
        Ok(vec![Bridge {
            name: "stargate".to_string(),
            display_name: "Stargate".to_string(),
            volume_prev_day: Some(40_000_000.0),
            volume_prev_2_day: Some(35_000_000.0),
            chains: vec!["Ethereum".to_string(), "Arbitrum".to_string()],
        }])
    }

    async fn social_metrics(&self, _limit: usize) -> Result<Vec<SocialMetric>> {
        self.hit()?;
        Ok(vec![SocialMetric {
            symbol: "BTC".to_string(),
            name: "Bitcoin".to_string(),
            galaxy_score: Some(71.0),
            alt_rank: Some(3),
            sentiment: Some(78.0),
            social_volume_24h: Some(120_000.0),
            interactions_24h: Some(95_000_000.0),
            social_dominance: Some(22.5),
        }])
    }

    async fn coin_sentiment(&self, symbol: &str) -> Result<CoinSentiment> {
        self.hit()?;
        Ok(CoinSentiment {
            summary: SocialMetric {
                symbol: symbol.to_uppercase(),
                name: "Bitcoin".to_string(),
                galaxy_score: Some(71.0),
                alt_rank: Some(3),
                sentiment: Some(78.0),
                social_volume_24h: Some(120_000.0),
                interactions_24h: Some(95_000_000.0),
                social_dominance: Some(22.5),
            },
            posts: vec![
                SocialPost {
                    title: "ETF inflows keep climbing".to_string(),
                    url: Some("https://x.com/post/1".to_string()),
                    creator: Some("analyst".to_string()),
                    network: Some("tweet".to_string()),
                    interactions: Some(12_000.0),
                    sentiment: Some(4.2),
                    created_at: Some(1_717_000_000),
                },
                SocialPost {
                    title: "Miners selling into strength".to_string(),
                    url: None,
                    creator: None,
                    network: Some("reddit-post".to_string()),
                    interactions: Some(800.0),
                    sentiment: Some(2.1),
                    created_at: Some(1_716_990_000),
                },
            ],
        })
    }

    async fn news(&self, _filter: Option<NewsFilter>, _symbols: &[String]) -> Result<Vec<NewsArticle>> {
        self.hit()?;
        Ok(vec![NewsArticle {
            title: "Bitcoin reclaims $65k".to_string(),
            url: "https://news.example/btc".to_string(),
            source: Some("CoinDesk".to_string()),
            published_at: Some("2024-06-01T00:00:00Z".to_string()),
            currencies: vec!["BTC".to_string()],
            votes_positive: 10,
            votes_negative: 1,
            kind: Some("news".to_string()),
        }])
    }

    async fn whale_transactions(&self, _min_value_usd: u64) -> Result<Vec<WhaleTransaction>> {
        self.hit()?;
        Ok(sample_whales())
    }

    async fn gas_oracle(&self) -> Result<GasOracle> {
        self.hit()?;
        Ok(GasOracle {
            last_block: 20_000_000,
            safe_gwei: 5.0,
            propose_gwei: 6.0,
            fast_gwei: 8.0,
            base_fee_gwei: Some(4.8),
        })
    }

    async fn blockchain_stats(&self) -> Result<BlockchainStats> {
        self.hit()?;
        Ok(BlockchainStats {
            market_price_usd: 65000.0,
            hash_rate: 6.0e11,
            difficulty: 8.4e13,
            blocks_mined_24h: 144,
            minutes_between_blocks: 9.8,
            transactions_24h: 450_000,
            total_fees_btc: 12.5,
            estimated_transaction_volume_usd: 1.2e10,
            timestamp: 1_717_000_000_000,
        })
    }

    async fn nft_collections(&self, chain: Option<&str>, _limit: usize) -> Result<Vec<NftCollection>> {
        self.hit()?;
        Ok(vec![NftCollection {
            id: "pudgy-penguins".to_string(),
            name: "Pudgy Penguins".to_string(),
            symbol: Some("PPG".to_string()),
            asset_platform_id: Some(chain.unwrap_or("ethereum").to_string()),
            contract_address: Some("0xbd3531da5cf5857e7cfaa92426877b022e612cf8".to_string()),
        }])
    }

    async fn nft_markets(&self, chain: Option<&str>, _limit: usize) -> Result<Vec<NftMarket>> {
        self.hit()?;
        Ok(vec![NftMarket {
            id: "pudgy-penguins".to_string(),
            name: "Pudgy Penguins".to_string(),
            symbol: Some("PPG".to_string()),
            asset_platform_id: Some(chain.unwrap_or("ethereum").to_string()),
            floor_price_usd: Some(38_000.0),
            market_cap_usd: Some(380_000_000.0),
            volume_24h_usd: Some(2_000_000.0),
            floor_price_change_24h: Some(-1.5),
            owners: Some(4800),
            total_supply: Some(8888),
        }])
    }
}

/// In-memory snapshot cache
#[derive(Default)]
pub struct FixtureCache {
    markets: Mutex<Vec<CoinMarket>>,
    failing: AtomicBool,
}

impl FixtureCache {
    pub fn with_markets(markets: Vec<CoinMarket>) -> Self {
        Self {
            markets: Mutex::new(markets),
            failing: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            markets: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    pub fn stored(&self) -> usize {
        self.markets.lock().len()
    }
}

#[async_trait]
impl MarketCache for FixtureCache {
    async fn load_markets(&self, _max_age: Duration) -> Result<Vec<CoinMarket>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cache unavailable".to_string()));
        }
        Ok(self.markets.lock().clone())
    }

    async fn store_markets(&self, markets: &[CoinMarket]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cache unavailable".to_string()));
        }
        *self.markets.lock() = markets.to_vec();
        Ok(())
    }
}
