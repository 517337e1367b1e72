//! Row shapers
//!
//! Pure functions from provider records to flat rows. Every row a shaper
//! emits carries the same keys in the same order; missing provider values
//! become `null`.

use super::request::{ExportRequest, SortBy};
use super::Row;
use crate::providers::types::*;
use chrono::DateTime;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

fn to_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn iso_from_millis(ms: i64) -> Value {
    DateTime::from_timestamp_millis(ms)
        .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%SZ").to_string()))
        .unwrap_or(Value::Null)
}

fn iso_from_secs(secs: i64) -> Value {
    iso_from_millis(secs.saturating_mul(1000))
}

fn date_from_secs(secs: i64) -> Value {
    DateTime::from_timestamp(secs, 0)
        .map(|t| Value::String(t.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

fn join(values: &[String]) -> String {
    values.join(", ")
}

// ============================================================================
// Market
// ============================================================================

/// Apply the market_overview filters: symbols, minimum cap, sort, limit
pub fn filter_markets(mut markets: Vec<CoinMarket>, request: &ExportRequest) -> Vec<CoinMarket> {
    if !request.symbols.is_empty() {
        markets.retain(|m| request.symbols.iter().any(|s| s.eq_ignore_ascii_case(&m.symbol)));
    }

    if let Some(min_cap) = request.min_market_cap {
        markets.retain(|m| m.market_cap.unwrap_or(0.0) >= min_cap);
    }

    match request.sort_by {
        Some(SortBy::MarketCap) => markets.sort_by(desc(|m| m.market_cap)),
        Some(SortBy::Volume) => markets.sort_by(desc(|m| m.total_volume)),
        Some(SortBy::Price) => markets.sort_by(desc(|m| m.current_price)),
        Some(SortBy::Change24h) => markets.sort_by(desc(|m| m.price_change_percentage_24h)),
        Some(SortBy::Name) => markets.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        None => {}
    }

    markets.truncate(request.limit);
    markets
}

fn desc(value: fn(&CoinMarket) -> Option<f64>) -> impl Fn(&CoinMarket, &CoinMarket) -> Ordering {
    move |a, b| {
        value(b)
            .unwrap_or(f64::NEG_INFINITY)
            .total_cmp(&value(a).unwrap_or(f64::NEG_INFINITY))
    }
}

pub fn market_overview(markets: &[CoinMarket]) -> Vec<Row> {
    markets
        .iter()
        .map(|m| {
            to_row(json!({
                "rank": m.market_cap_rank,
                "symbol": m.symbol.to_uppercase(),
                "name": m.name,
                "price": m.current_price,
                "market_cap": m.market_cap,
                "volume_24h": m.total_volume,
                "change_24h": m.price_change_percentage_24h,
                "change_7d": m.price_change_percentage_7d_in_currency,
                "high_24h": m.high_24h,
                "low_24h": m.low_24h,
                "circulating_supply": m.circulating_supply,
                "last_updated": m.last_updated,
            }))
        })
        .collect()
}

pub fn coin_details(markets: &[CoinMarket]) -> Vec<Row> {
    markets
        .iter()
        .map(|m| {
            to_row(json!({
                "symbol": m.symbol.to_uppercase(),
                "name": m.name,
                "price": m.current_price,
                "market_cap": m.market_cap,
                "market_cap_rank": m.market_cap_rank,
                "circulating_supply": m.circulating_supply,
                "total_supply": m.total_supply,
                "max_supply": m.max_supply,
                "ath": m.ath,
                "ath_change_percent": m.ath_change_percentage,
                "ath_date": m.ath_date,
                "atl": m.atl,
                "atl_date": m.atl_date,
            }))
        })
        .collect()
}

pub fn historical_prices(symbol: &str, interval: Interval, candles: &[Candle]) -> Vec<Row> {
    candles
        .iter()
        .map(|c| {
            to_row(json!({
                "date": iso_from_millis(c.open_time),
                "symbol": symbol,
                "interval": interval.as_str(),
                "open": c.open,
                "high": c.high,
                "low": c.low,
                "close": c.close,
                "volume": c.volume,
                "quote_volume": c.quote_volume,
                "trades": c.trades,
            }))
        })
        .collect()
}

/// Simple moving average; `None` until the window is full
pub fn sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            (period > 0 && i + 1 >= period)
                .then(|| closes[i + 1 - period..=i].iter().sum::<f64>() / period as f64)
        })
        .collect()
}

/// Exponential moving average seeded with the first full SMA window
pub fn ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = closes[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for i in period..closes.len() {
        prev = closes[i] * k + prev * (1.0 - k);
        out[i] = Some(prev);
    }
    out
}

/// Wilder's relative strength index
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let change = |i: usize| closes[i] - closes[i - 1];
    let mut avg_gain = (1..=period).map(|i| change(i).max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = (1..=period).map(|i| (-change(i)).max(0.0)).sum::<f64>() / period as f64;

    let value = |gain: f64, loss: f64| {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };

    out[period] = Some(value(avg_gain, avg_loss));
    for i in period + 1..closes.len() {
        let delta = change(i);
        avg_gain = (avg_gain * (period as f64 - 1.0) + delta.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-delta).max(0.0)) / period as f64;
        out[i] = Some(value(avg_gain, avg_loss));
    }
    out
}

pub fn technical_indicators(symbol: &str, candles: &[Candle]) -> Vec<Row> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let sma_20 = sma(&closes, 20);
    let sma_50 = sma(&closes, 50);
    let ema_12 = ema(&closes, 12);
    let ema_26 = ema(&closes, 26);
    let rsi_14 = rsi(&closes, 14);

    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let macd = match (ema_12[i], ema_26[i]) {
                (Some(fast), Some(slow)) => Some(fast - slow),
                _ => None,
            };
            to_row(json!({
                "date": iso_from_millis(c.open_time),
                "symbol": symbol,
                "close": c.close,
                "sma_20": sma_20[i],
                "sma_50": sma_50[i],
                "ema_12": ema_12[i],
                "ema_26": ema_26[i],
                "macd": macd,
                "rsi_14": rsi_14[i],
            }))
        })
        .collect()
}

/// One row per depth level; only the first row carries the book aggregates
pub fn order_book(book: &OrderBook) -> Vec<Row> {
    let levels = book.bids.len().max(book.asks.len());

    (0..levels)
        .map(|i| {
            let bid = book.bids.get(i);
            let ask = book.asks.get(i);
            let aggregate = |value: f64| if i == 0 { json!(value) } else { json!("") };
            to_row(json!({
                "symbol": book.symbol,
                "level": i + 1,
                "bid_price": bid.map(|l| l.price),
                "bid_quantity": bid.map(|l| l.quantity),
                "ask_price": ask.map(|l| l.price),
                "ask_quantity": ask.map(|l| l.quantity),
                "spread": aggregate(book.spread),
                "spread_percent": aggregate(book.spread_percent),
                "total_bid_volume": aggregate(book.total_bid_volume),
                "total_ask_volume": aggregate(book.total_ask_volume),
            }))
        })
        .collect()
}

pub fn recent_trades(symbol: &str, trades: &[Trade]) -> Vec<Row> {
    trades
        .iter()
        .map(|t| {
            let side = if t.is_buyer_maker { "SELL" } else { "BUY" };
            to_row(json!({
                "trade_id": t.id,
                "time": iso_from_millis(t.time),
                "symbol": symbol,
                "price": t.price,
                "quantity": t.quantity,
                "quote_quantity": t.quote_quantity,
                "side": side,
            }))
        })
        .collect()
}

pub fn ticker_24h(tickers: &[Ticker24h]) -> Vec<Row> {
    tickers
        .iter()
        .map(|t| {
            to_row(json!({
                "symbol": t.symbol,
                "last_price": t.last_price,
                "price_change": t.price_change,
                "price_change_percent": t.price_change_percent,
                "high_24h": t.high_price,
                "low_24h": t.low_price,
                "volume": t.volume,
                "quote_volume": t.quote_volume,
                "trades": t.trade_count,
            }))
        })
        .collect()
}

/// Gainers (change descending) followed by losers (change ascending)
pub fn gainers_losers(mut gainers: Vec<CoinMarket>, mut losers: Vec<CoinMarket>) -> Vec<Row> {
    let change = |m: &CoinMarket| m.price_change_percentage_24h.unwrap_or(0.0);
    gainers.sort_by(|a, b| change(b).total_cmp(&change(a)));
    losers.sort_by(|a, b| change(a).total_cmp(&change(b)));

    let rows = |kind: MoverKind, list: Vec<CoinMarket>| -> Vec<Row> {
        list.into_iter()
            .enumerate()
            .map(|(i, m)| {
                to_row(json!({
                    "rank_type": kind.label(),
                    "rank": i + 1,
                    "symbol": m.symbol.to_uppercase(),
                    "name": m.name,
                    "price": m.current_price,
                    "change_24h": m.price_change_percentage_24h,
                    "volume_24h": m.total_volume,
                    "market_cap": m.market_cap,
                }))
            })
            .collect()
    };

    let mut out = rows(MoverKind::Gainers, gainers);
    out.extend(rows(MoverKind::Losers, losers));
    out
}

pub fn trending(coins: &[TrendingCoin]) -> Vec<Row> {
    coins
        .iter()
        .map(|c| {
            to_row(json!({
                "rank": c.score + 1,
                "symbol": c.symbol.to_uppercase(),
                "name": c.name,
                "market_cap_rank": c.market_cap_rank,
                "price_usd": c.price_usd,
                "price_btc": c.price_btc,
                "change_24h": c.price_change_percentage_24h,
            }))
        })
        .collect()
}

pub fn global_stats(stats: &GlobalStats) -> Vec<Row> {
    let share = |symbol: &str| {
        stats
            .market_cap_percentage
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, pct)| *pct)
    };

    vec![to_row(json!({
        "active_cryptocurrencies": stats.active_cryptocurrencies,
        "markets": stats.markets,
        "total_market_cap_usd": stats.total_market_cap_usd,
        "total_volume_usd": stats.total_volume_usd,
        "market_cap_change_24h": stats.market_cap_change_percentage_24h_usd,
        "btc_dominance": share("BTC"),
        "eth_dominance": share("ETH"),
        "updated_at": iso_from_secs(stats.updated_at),
    }))]
}

pub fn dominance(stats: &GlobalStats) -> Vec<Row> {
    stats
        .market_cap_percentage
        .iter()
        .enumerate()
        .map(|(i, (symbol, pct))| {
            to_row(json!({
                "rank": i + 1,
                "symbol": symbol,
                "dominance_percent": pct,
            }))
        })
        .collect()
}

pub fn coin_categories(categories: &[CoinCategory]) -> Vec<Row> {
    categories
        .iter()
        .map(|c| {
            to_row(json!({
                "id": c.id,
                "name": c.name,
                "market_cap": c.market_cap,
                "market_cap_change_24h": c.market_cap_change_24h,
                "volume_24h": c.volume_24h,
                "updated_at": c.updated_at,
            }))
        })
        .collect()
}

pub fn exchanges(exchanges: &[Exchange]) -> Vec<Row> {
    exchanges
        .iter()
        .map(|e| {
            to_row(json!({
                "rank": e.trust_score_rank,
                "id": e.id,
                "name": e.name,
                "country": e.country,
                "year_established": e.year_established,
                "trust_score": e.trust_score,
                "volume_24h_btc": e.trade_volume_24h_btc,
                "url": e.url,
            }))
        })
        .collect()
}

pub fn derivatives(tickers: &[DerivativeTicker]) -> Vec<Row> {
    tickers
        .iter()
        .map(|t| {
            to_row(json!({
                "market": t.market,
                "symbol": t.symbol,
                "index": t.index_id,
                "price": t.price.as_deref().and_then(|p| p.parse::<f64>().ok()),
                "change_24h": t.price_percentage_change_24h,
                "contract_type": t.contract_type,
                "funding_rate": t.funding_rate,
                "open_interest": t.open_interest,
                "volume_24h": t.volume_24h,
            }))
        })
        .collect()
}

pub fn funding_rates(rates: &[FundingRate]) -> Vec<Row> {
    rates
        .iter()
        .map(|r| {
            to_row(json!({
                "symbol": r.symbol,
                "mark_price": r.mark_price,
                "index_price": r.index_price,
                "funding_rate": r.funding_rate,
                "funding_rate_percent": r.funding_rate * 100.0,
                "next_funding_time": iso_from_millis(r.next_funding_time),
            }))
        })
        .collect()
}

pub fn open_interest(entries: &[OpenInterest]) -> Vec<Row> {
    entries
        .iter()
        .map(|o| {
            to_row(json!({
                "symbol": o.symbol,
                "open_interest": o.open_interest,
                "time": iso_from_millis(o.time),
            }))
        })
        .collect()
}

pub fn fear_greed(entries: &[FearGreedEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|e| {
            to_row(json!({
                "date": date_from_secs(e.timestamp),
                "value": e.value,
                "classification": e.classification,
            }))
        })
        .collect()
}

// ============================================================================
// DeFi
// ============================================================================

pub fn defi_protocols(protocols: &[Protocol]) -> Vec<Row> {
    protocols
        .iter()
        .enumerate()
        .map(|(i, p)| {
            to_row(json!({
                "rank": i + 1,
                "name": p.name,
                "symbol": p.symbol,
                "category": p.category,
                "chains": join(&p.chains),
                "tvl": p.tvl,
                "change_1d": p.change_1d,
                "change_7d": p.change_7d,
                "mcap": p.mcap,
            }))
        })
        .collect()
}

/// Chains with their share of the summed TVL
pub fn chain_tvl(chains: &[ChainTvl]) -> Vec<Row> {
    let total: f64 = chains.iter().map(|c| c.tvl).sum();

    chains
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let dominance = if total > 0.0 { c.tvl / total * 100.0 } else { 0.0 };
            to_row(json!({
                "rank": i + 1,
                "chain": c.name,
                "token_symbol": c.token_symbol,
                "tvl": c.tvl,
                "dominance": dominance,
            }))
        })
        .collect()
}

pub fn yields(pools: &[YieldPool]) -> Vec<Row> {
    pools
        .iter()
        .map(|p| {
            to_row(json!({
                "pool": p.pool,
                "project": p.project,
                "chain": p.chain,
                "symbol": p.symbol,
                "tvl_usd": p.tvl_usd,
                "apy": p.apy,
                "apy_base": p.apy_base,
                "apy_reward": p.apy_reward,
                "stablecoin": p.stablecoin,
            }))
        })
        .collect()
}

pub fn stablecoins(coins: &[Stablecoin]) -> Vec<Row> {
    coins
        .iter()
        .map(|s| {
            to_row(json!({
                "name": s.name,
                "symbol": s.symbol,
                "peg_type": s.peg_type,
                "peg_mechanism": s.peg_mechanism,
                "circulating_usd": s.circulating_usd,
                "price": s.price,
                "chain_count": s.chains.len(),
            }))
        })
        .collect()
}

/// DEX volume or fee overview; `measure` prefixes the totals (`volume_24h`, `fees_24h`)
pub fn protocol_activity(items: &[ProtocolActivity], measure: &str) -> Vec<Row> {
    items
        .iter()
        .map(|p| {
            let mut row = Row::new();
            row.insert("name".into(), json!(p.name));
            row.insert("category".into(), json!(p.category));
            row.insert("chains".into(), json!(join(&p.chains)));
            row.insert(format!("{}_24h", measure), json!(p.total_24h));
            row.insert(format!("{}_7d", measure), json!(p.total_7d));
            row.insert(format!("{}_30d", measure), json!(p.total_30d));
            row.insert("change_1d".into(), json!(p.change_1d));
            row
        })
        .collect()
}

pub fn bridges(bridges: &[Bridge]) -> Vec<Row> {
    bridges
        .iter()
        .map(|b| {
            let change = match (b.volume_prev_day, b.volume_prev_2_day) {
                (Some(day), Some(before)) if before > 0.0 => Some((day - before) / before * 100.0),
                _ => None,
            };
            to_row(json!({
                "name": b.display_name,
                "id": b.name,
                "volume_24h": b.volume_prev_day,
                "volume_prev_24h": b.volume_prev_2_day,
                "change_percent": change,
                "chains": join(&b.chains),
            }))
        })
        .collect()
}

// ============================================================================
// Social and news
// ============================================================================

pub fn social_sentiment(metrics: &[SocialMetric]) -> Vec<Row> {
    metrics
        .iter()
        .enumerate()
        .map(|(i, m)| {
            to_row(json!({
                "rank": i + 1,
                "symbol": m.symbol,
                "name": m.name,
                "galaxy_score": m.galaxy_score,
                "alt_rank": m.alt_rank,
                "sentiment": m.sentiment,
                "social_volume_24h": m.social_volume_24h,
                "interactions_24h": m.interactions_24h,
                "social_dominance": m.social_dominance,
            }))
        })
        .collect()
}

/// Summary record then one record per post, all sharing one column set
pub fn sentiment_coin(sentiment: &CoinSentiment) -> Vec<Row> {
    let s = &sentiment.summary;
    let mut rows = vec![to_row(json!({
        "record_type": "summary",
        "symbol": s.symbol,
        "name": s.name,
        "galaxy_score": s.galaxy_score,
        "alt_rank": s.alt_rank,
        "sentiment": s.sentiment,
        "social_volume_24h": s.social_volume_24h,
        "interactions_24h": s.interactions_24h,
        "title": null,
        "url": null,
        "creator": null,
        "network": null,
        "interactions": null,
        "post_sentiment": null,
        "created_at": null,
    }))];

    rows.extend(sentiment.posts.iter().map(|p| {
        to_row(json!({
            "record_type": "post",
            "symbol": s.symbol,
            "name": s.name,
            "galaxy_score": null,
            "alt_rank": null,
            "sentiment": null,
            "social_volume_24h": null,
            "interactions_24h": null,
            "title": p.title,
            "url": p.url,
            "creator": p.creator,
            "network": p.network,
            "interactions": p.interactions,
            "post_sentiment": p.sentiment,
            "created_at": p.created_at.map(iso_from_secs),
        }))
    }));

    rows
}

pub fn news(articles: &[NewsArticle]) -> Vec<Row> {
    articles
        .iter()
        .map(|a| {
            to_row(json!({
                "published_at": a.published_at,
                "title": a.title,
                "source": a.source,
                "currencies": join(&a.currencies),
                "votes_positive": a.votes_positive,
                "votes_negative": a.votes_negative,
                "kind": a.kind,
                "url": a.url,
            }))
        })
        .collect()
}

// ============================================================================
// Explorer and whale tracking
// ============================================================================

pub fn whale_transactions(transactions: &[WhaleTransaction]) -> Vec<Row> {
    transactions
        .iter()
        .map(|t| {
            to_row(json!({
                "time": iso_from_secs(t.timestamp),
                "blockchain": t.blockchain,
                "symbol": t.symbol,
                "amount": t.amount,
                "amount_usd": t.amount_usd,
                "from": t.from_owner,
                "from_type": t.from_owner_type,
                "to": t.to_owner,
                "to_type": t.to_owner_type,
                "transaction_type": t.transaction_type,
                "hash": t.hash,
            }))
        })
        .collect()
}

/// Per-exchange inflow and outflow, largest absolute net flow first
pub fn exchange_flows(transactions: &[WhaleTransaction]) -> Vec<Row> {
    #[derive(Default)]
    struct Flow {
        inflow: f64,
        outflow: f64,
        count: u64,
    }

    let exchange_owner = |owner: &Option<String>, kind: &Option<String>| -> Option<String> {
        match (owner, kind.as_deref()) {
            (Some(name), Some("exchange")) if !name.is_empty() => Some(name.to_lowercase()),
            _ => None,
        }
    };

    let mut flows: HashMap<String, Flow> = HashMap::new();
    for t in transactions {
        if let Some(exchange) = exchange_owner(&t.to_owner, &t.to_owner_type) {
            let flow = flows.entry(exchange).or_default();
            flow.inflow += t.amount_usd;
            flow.count += 1;
        }
        if let Some(exchange) = exchange_owner(&t.from_owner, &t.from_owner_type) {
            let flow = flows.entry(exchange).or_default();
            flow.outflow += t.amount_usd;
            flow.count += 1;
        }
    }

    let mut flows: Vec<(String, Flow)> = flows.into_iter().collect();
    flows.sort_by(|(a_name, a), (b_name, b)| {
        (b.inflow - b.outflow)
            .abs()
            .total_cmp(&(a.inflow - a.outflow).abs())
            .then_with(|| a_name.cmp(b_name))
    });

    flows
        .into_iter()
        .map(|(exchange, f)| {
            to_row(json!({
                "exchange": exchange,
                "inflow_usd": f.inflow,
                "outflow_usd": f.outflow,
                "net_flow_usd": f.inflow - f.outflow,
                "transaction_count": f.count,
            }))
        })
        .collect()
}

pub fn gas_prices(gas: &GasOracle) -> Vec<Row> {
    vec![to_row(json!({
        "last_block": gas.last_block,
        "safe_gwei": gas.safe_gwei,
        "propose_gwei": gas.propose_gwei,
        "fast_gwei": gas.fast_gwei,
        "base_fee_gwei": gas.base_fee_gwei,
    }))]
}

pub fn blockchain_stats(stats: &BlockchainStats) -> Vec<Row> {
    vec![to_row(json!({
        "market_price_usd": stats.market_price_usd,
        "hash_rate": stats.hash_rate,
        "difficulty": stats.difficulty,
        "blocks_mined_24h": stats.blocks_mined_24h,
        "minutes_between_blocks": stats.minutes_between_blocks,
        "transactions_24h": stats.transactions_24h,
        "total_fees_btc": stats.total_fees_btc,
        "estimated_volume_usd": stats.estimated_transaction_volume_usd,
        "timestamp": iso_from_millis(stats.timestamp),
    }))]
}

// ============================================================================
// NFT
// ============================================================================

pub fn nft_collections(collections: &[NftCollection]) -> Vec<Row> {
    collections
        .iter()
        .map(|c| {
            to_row(json!({
                "id": c.id,
                "name": c.name,
                "symbol": c.symbol,
                "chain": c.asset_platform_id,
                "contract_address": c.contract_address,
            }))
        })
        .collect()
}

pub fn nft_stats(markets: &[NftMarket]) -> Vec<Row> {
    markets
        .iter()
        .enumerate()
        .map(|(i, n)| {
            to_row(json!({
                "rank": i + 1,
                "id": n.id,
                "name": n.name,
                "symbol": n.symbol,
                "chain": n.asset_platform_id,
                "floor_price_usd": n.floor_price_usd,
                "floor_change_24h": n.floor_price_change_24h,
                "market_cap_usd": n.market_cap_usd,
                "volume_24h_usd": n.volume_24h_usd,
                "owners": n.owners,
                "total_supply": n.total_supply,
            }))
        })
        .collect()
}
