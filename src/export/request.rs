//! Download request parsing and validation

use super::category::Category;
use super::format::ExportFormat;
use crate::providers::types::{BookDepth, Interval, NewsFilter};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_SYMBOL: &str = "BTC";
pub const DEFAULT_LIMIT: usize = 500;
pub const MAX_LIMIT: usize = 1000;

/// Raw `/api/download` query string, exactly as sent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub category: Option<String>,
    pub format: Option<String>,
    pub preview: Option<String>,
    pub excel: Option<String>,
    pub fields: Option<String>,
    pub symbols: Option<String>,
    pub coin_category: Option<String>,
    pub sort_by: Option<String>,
    pub min_market_cap: Option<String>,
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub limit: Option<String>,
    pub depth: Option<String>,
    #[serde(rename = "type")]
    pub rank_type: Option<String>,
    pub filter: Option<String>,
    pub chain: Option<String>,
}

impl DownloadQuery {
    pub fn is_excel(&self) -> bool {
        flag(self.excel.as_deref())
    }

    pub fn is_preview(&self) -> bool {
        flag(self.preview.as_deref())
    }
}

/// 400 body naming the rejected value and what would have been accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidParameter {
    pub error: String,
    pub value: String,
    pub allowed: Vec<String>,
}

impl InvalidParameter {
    fn new<S: ToString>(param: &str, value: &str, allowed: impl IntoIterator<Item = S>) -> Self {
        Self {
            error: format!("Invalid {} '{}'", param, value),
            value: value.to_string(),
            allowed: allowed.into_iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// market_overview sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    MarketCap,
    Volume,
    Price,
    Change24h,
    Name,
}

impl SortBy {
    pub const ALL: [SortBy; 5] = [
        SortBy::MarketCap,
        SortBy::Volume,
        SortBy::Price,
        SortBy::Change24h,
        SortBy::Name,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::MarketCap => "market_cap",
            SortBy::Volume => "volume",
            SortBy::Price => "price",
            SortBy::Change24h => "change_24h",
            SortBy::Name => "name",
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortBy::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// gainers_losers sub-list selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankType {
    #[default]
    Both,
    Gainers,
    Losers,
}

impl RankType {
    pub const ALL: [RankType; 3] = [RankType::Both, RankType::Gainers, RankType::Losers];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankType::Both => "both",
            RankType::Gainers => "gainers",
            RankType::Losers => "losers",
        }
    }
}

impl FromStr for RankType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RankType::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Validated download request
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub category: Category,
    pub format: ExportFormat,
    pub preview: bool,
    pub excel: bool,
    pub fields: Option<Vec<String>>,
    pub symbols: Vec<String>,
    pub coin_category: Option<String>,
    pub sort_by: Option<SortBy>,
    pub min_market_cap: Option<f64>,
    pub symbol: String,
    pub interval: Interval,
    pub limit: usize,
    pub depth: BookDepth,
    pub rank_type: RankType,
    pub news_filter: Option<NewsFilter>,
    pub chain: Option<String>,
}

impl ExportRequest {
    /// Request with defaults for everything but category and format
    pub fn new(category: Category, format: ExportFormat) -> Self {
        Self {
            category,
            format,
            preview: false,
            excel: false,
            fields: None,
            symbols: Vec::new(),
            coin_category: None,
            sort_by: None,
            min_market_cap: None,
            symbol: DEFAULT_SYMBOL.to_string(),
            interval: Interval::default(),
            limit: DEFAULT_LIMIT,
            depth: BookDepth::default(),
            rank_type: RankType::default(),
            news_filter: None,
            chain: None,
        }
    }

    /// Validate the enumerated filters and parse the rest leniently
    pub fn from_query(
        query: &DownloadQuery,
        category: Category,
        format: ExportFormat,
    ) -> Result<Self, InvalidParameter> {
        let mut request = Self::new(category, format);
        request.preview = query.is_preview();
        request.excel = query.is_excel();

        if let Some(raw) = non_empty(&query.interval) {
            request.interval = raw
                .parse()
                .map_err(|_| InvalidParameter::new("interval", raw, Interval::ALL.iter().map(|i| i.as_str())))?;
        }

        if let Some(raw) = non_empty(&query.depth) {
            request.depth = raw
                .parse::<u32>()
                .ok()
                .and_then(BookDepth::new)
                .ok_or_else(|| InvalidParameter::new("depth", raw, BookDepth::ALLOWED))?;
        }

        if let Some(raw) = non_empty(&query.rank_type) {
            request.rank_type = raw
                .parse()
                .map_err(|_| InvalidParameter::new("type", raw, RankType::ALL.iter().map(|t| t.as_str())))?;
        }

        if let Some(raw) = non_empty(&query.filter) {
            request.news_filter = Some(
                raw.parse()
                    .map_err(|_| InvalidParameter::new("filter", raw, NewsFilter::ALL.iter().map(|f| f.as_str())))?,
            );
        }

        if let Some(raw) = non_empty(&query.sort_by) {
            request.sort_by = Some(
                raw.parse()
                    .map_err(|_| InvalidParameter::new("sortBy", raw, SortBy::ALL.iter().map(|s| s.as_str())))?,
            );
        }

        request.limit = non_empty(&query.limit)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|n| n.clamp(1, MAX_LIMIT as i64) as usize)
            .unwrap_or(DEFAULT_LIMIT);

        request.min_market_cap = non_empty(&query.min_market_cap)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|v| v.is_finite());

        if let Some(symbol) = non_empty(&query.symbol) {
            request.symbol = symbol.to_uppercase();
        }

        request.symbols = split_list(query.symbols.as_deref())
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect();

        let fields = split_list(query.fields.as_deref());
        request.fields = (!fields.is_empty()).then_some(fields);

        request.coin_category = non_empty(&query.coin_category).map(str::to_string);
        request.chain = non_empty(&query.chain).map(|c| c.to_lowercase());

        Ok(request)
    }
}

/// Validate `format`; missing means xlsx
pub fn parse_format(raw: Option<&str>) -> Result<ExportFormat, InvalidParameter> {
    match raw {
        None => Ok(ExportFormat::default()),
        Some(value) => value
            .parse()
            .map_err(|_| InvalidParameter::new("format", value, ExportFormat::allowed())),
    }
}

/// Validate `category`; missing means market_overview
pub fn parse_category(raw: Option<&str>) -> Result<Category, InvalidParameter> {
    match raw {
        None => Ok(Category::MarketOverview),
        Some(value) => value
            .parse()
            .map_err(|_| InvalidParameter::new("category", value, Category::allowed())),
    }
}

/// Query-string boolean
pub fn flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Comma separated list with blanks dropped
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> DownloadQuery {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let request = ExportRequest::from_query(&query(&[]), Category::HistoricalPrices, ExportFormat::Csv).unwrap();
        assert_eq!(request.symbol, "BTC");
        assert_eq!(request.interval, Interval::D1);
        assert_eq!(request.limit, 500);
        assert_eq!(request.depth.levels(), 20);
        assert_eq!(request.rank_type, RankType::Both);
        assert!(request.fields.is_none());
        assert!(!request.preview && !request.excel);
    }

    #[test]
    fn test_missing_format_and_category_take_defaults() {
        assert_eq!(parse_format(None), Ok(ExportFormat::Xlsx));
        assert_eq!(parse_category(None), Ok(Category::MarketOverview));
    }

    #[test]
    fn test_invalid_format_names_value_and_allowed_set() {
        let err = parse_format(Some("pdf")).unwrap_err();
        assert_eq!(err.value, "pdf");
        assert_eq!(err.allowed, vec!["xlsx", "csv", "json", "iqy"]);
    }

    #[test]
    fn test_invalid_category_lists_every_category() {
        let err = parse_category(Some("memes")).unwrap_err();
        assert_eq!(err.value, "memes");
        assert_eq!(err.allowed.len(), 33);
    }

    #[test]
    fn test_enumerated_filters_rejected() {
        let q = query(&[("interval", "2d")]);
        let err = ExportRequest::from_query(&q, Category::HistoricalPrices, ExportFormat::Json).unwrap_err();
        assert_eq!(err.value, "2d");
        assert!(err.allowed.contains(&"1M".to_string()));

        let q = query(&[("depth", "25")]);
        let err = ExportRequest::from_query(&q, Category::OrderBook, ExportFormat::Json).unwrap_err();
        assert_eq!(err.allowed, vec!["5", "10", "20", "50", "100", "500", "1000"]);

        for (param, value) in [("type", "sideways"), ("filter", "spicy"), ("sortBy", "rank")] {
            let q = query(&[(param, value)]);
            assert!(ExportRequest::from_query(&q, Category::MarketOverview, ExportFormat::Json).is_err());
        }
    }

    #[test]
    fn test_limit_is_lenient_and_clamped() {
        let parse = |limit: &str| {
            ExportRequest::from_query(&query(&[("limit", limit)]), Category::FearGreed, ExportFormat::Json)
                .unwrap()
                .limit
        };
        assert_eq!(parse("abc"), 500);
        assert_eq!(parse("0"), 1);
        assert_eq!(parse("-5"), 1);
        assert_eq!(parse("5000"), 1000);
        assert_eq!(parse("30"), 30);
    }

    #[test]
    fn test_lists_and_flags() {
        let q = query(&[
            ("symbols", "btc, eth,,sol"),
            ("fields", "symbol,price"),
            ("preview", "true"),
            ("excel", "1"),
            ("symbol", "eth"),
        ]);
        let request = ExportRequest::from_query(&q, Category::MarketOverview, ExportFormat::Csv).unwrap();
        assert_eq!(request.symbols, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(request.fields, Some(vec!["symbol".to_string(), "price".to_string()]));
        assert_eq!(request.symbol, "ETH");
        assert!(request.preview);
        assert!(request.excel);
    }
}
