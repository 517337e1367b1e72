//! Power Query (M language) templates
//!
//! Each dashboard kind is a fixed query against the CSV export of one
//! category, with the column list pinned through `fields=` so the typed
//! transform never references a column the export does not emit.

use crate::error::{AppError, Result};
use crate::export::Category;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::str::FromStr;
use ColumnType::*;

pub const MAX_COINS: usize = 50;
pub const MAX_LIMIT: usize = 1000;
pub const MAX_DAYS: u32 = 365;

const DEFAULT_COINS: [&str; 3] = ["btc", "eth", "sol"];
const DEFAULT_LIMIT: usize = 100;
const DEFAULT_DAYS: u32 = 30;

/// M column type used in `Table.TransformColumnTypes`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Number,
    Int,
    Date,
    DateTimeZone,
}

impl ColumnType {
    fn m_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "type text",
            ColumnType::Number => "type number",
            ColumnType::Int => "Int64.Type",
            ColumnType::Date => "type date",
            ColumnType::DateTimeZone => "type datetimezone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerQueryKind {
    MarketOverview,
    Watchlist,
    PriceHistory,
    FearGreed,
    DefiTvl,
    GainersLosers,
}

const MARKET_COLUMNS: &[(&str, ColumnType)] = &[
    ("rank", Int),
    ("symbol", Text),
    ("name", Text),
    ("price", Number),
    ("market_cap", Number),
    ("volume_24h", Number),
    ("change_24h", Number),
    ("change_7d", Number),
    ("last_updated", DateTimeZone),
];

const WATCHLIST_COLUMNS: &[(&str, ColumnType)] = &[
    ("symbol", Text),
    ("name", Text),
    ("price", Number),
    ("change_24h", Number),
    ("change_7d", Number),
    ("high_24h", Number),
    ("low_24h", Number),
    ("volume_24h", Number),
];

const PRICE_HISTORY_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", DateTimeZone),
    ("open", Number),
    ("high", Number),
    ("low", Number),
    ("close", Number),
    ("volume", Number),
];

const FEAR_GREED_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", Date),
    ("value", Int),
    ("classification", Text),
];

const DEFI_TVL_COLUMNS: &[(&str, ColumnType)] = &[
    ("rank", Int),
    ("name", Text),
    ("category", Text),
    ("chains", Text),
    ("tvl", Number),
    ("change_1d", Number),
    ("change_7d", Number),
];

const GAINERS_LOSERS_COLUMNS: &[(&str, ColumnType)] = &[
    ("rank_type", Text),
    ("rank", Int),
    ("symbol", Text),
    ("name", Text),
    ("price", Number),
    ("change_24h", Number),
    ("volume_24h", Number),
];

impl PowerQueryKind {
    pub const ALL: [PowerQueryKind; 6] = [
        PowerQueryKind::MarketOverview,
        PowerQueryKind::Watchlist,
        PowerQueryKind::PriceHistory,
        PowerQueryKind::FearGreed,
        PowerQueryKind::DefiTvl,
        PowerQueryKind::GainersLosers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerQueryKind::MarketOverview => "market_overview",
            PowerQueryKind::Watchlist => "watchlist",
            PowerQueryKind::PriceHistory => "price_history",
            PowerQueryKind::FearGreed => "fear_greed",
            PowerQueryKind::DefiTvl => "defi_tvl",
            PowerQueryKind::GainersLosers => "gainers_losers",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PowerQueryKind::MarketOverview => "Market Overview",
            PowerQueryKind::Watchlist => "Watchlist",
            PowerQueryKind::PriceHistory => "Price History",
            PowerQueryKind::FearGreed => "Fear & Greed Index",
            PowerQueryKind::DefiTvl => "DeFi TVL",
            PowerQueryKind::GainersLosers => "Top Gainers & Losers",
        }
    }

    /// Export category the query reads
    pub fn category(&self) -> Category {
        match self {
            PowerQueryKind::MarketOverview | PowerQueryKind::Watchlist => Category::MarketOverview,
            PowerQueryKind::PriceHistory => Category::HistoricalPrices,
            PowerQueryKind::FearGreed => Category::FearGreed,
            PowerQueryKind::DefiTvl => Category::DefiProtocols,
            PowerQueryKind::GainersLosers => Category::GainersLosers,
        }
    }

    pub fn columns(&self) -> &'static [(&'static str, ColumnType)] {
        match self {
            PowerQueryKind::MarketOverview => MARKET_COLUMNS,
            PowerQueryKind::Watchlist => WATCHLIST_COLUMNS,
            PowerQueryKind::PriceHistory => PRICE_HISTORY_COLUMNS,
            PowerQueryKind::FearGreed => FEAR_GREED_COLUMNS,
            PowerQueryKind::DefiTvl => DEFI_TVL_COLUMNS,
            PowerQueryKind::GainersLosers => GAINERS_LOSERS_COLUMNS,
        }
    }
}

impl FromStr for PowerQueryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PowerQueryKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Template parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerQueryParams {
    /// Lowercase coin symbols
    pub coins: Vec<String>,
    pub limit: usize,
    pub days: u32,
}

impl Default for PowerQueryParams {
    fn default() -> Self {
        Self {
            coins: DEFAULT_COINS.iter().map(|c| c.to_string()).collect(),
            limit: DEFAULT_LIMIT,
            days: DEFAULT_DAYS,
        }
    }
}

impl PowerQueryParams {
    /// Parse raw query values; missing values take defaults, present but
    /// invalid ones are rejected.
    pub fn from_raw(coins: Option<&str>, limit: Option<&str>, days: Option<&str>) -> Result<Self> {
        let mut params = Self::default();

        if let Some(raw) = coins.filter(|s| !s.trim().is_empty()) {
            params.coins = raw
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(raw) = limit {
            params.limit = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Validation(format!("Invalid limit '{}'", raw)))?;
        }
        if let Some(raw) = days {
            params.days = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Validation(format!("Invalid days '{}'", raw)))?;
        }

        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.coins.is_empty() || self.coins.len() > MAX_COINS {
            return Err(AppError::Validation(format!(
                "coins must list between 1 and {} entries",
                MAX_COINS
            )));
        }
        if let Some(bad) = self.coins.iter().find(|c| !is_coin_id(c)) {
            return Err(AppError::Validation(format!("Invalid coin '{}'", bad)));
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(AppError::Validation(format!("limit must be between 1 and {}", MAX_LIMIT)));
        }
        if !(1..=MAX_DAYS).contains(&self.days) {
            return Err(AppError::Validation(format!("days must be between 1 and {}", MAX_DAYS)));
        }
        Ok(())
    }
}

fn is_coin_id(coin: &str) -> bool {
    !coin.is_empty()
        && coin
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// `Query` record entries for `Web.Contents`
fn query_pairs(kind: PowerQueryKind, params: &PowerQueryParams) -> Vec<(&'static str, String)> {
    let fields = kind
        .columns()
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(",");
    let upper = |c: &String| c.to_ascii_uppercase();

    let mut pairs = vec![("category", kind.category().as_str().to_string())];
    match kind {
        PowerQueryKind::MarketOverview | PowerQueryKind::DefiTvl => {
            pairs.push(("limit", params.limit.to_string()));
        }
        PowerQueryKind::Watchlist => {
            pairs.push(("symbols", params.coins.iter().map(upper).collect::<Vec<_>>().join(",")));
        }
        PowerQueryKind::PriceHistory => {
            let symbol = params.coins.first().map(upper).unwrap_or_else(|| "BTC".to_string());
            pairs.push(("symbol", symbol));
            pairs.push(("interval", "1d".to_string()));
            pairs.push(("limit", params.days.to_string()));
        }
        PowerQueryKind::FearGreed => {
            pairs.push(("limit", params.days.to_string()));
        }
        PowerQueryKind::GainersLosers => {
            pairs.push(("type", "both".to_string()));
            pairs.push(("limit", params.limit.min(100).to_string()));
        }
    }
    pairs.push(("fields", fields));
    pairs.push(("format", "csv".to_string()));
    pairs.push(("excel", "true".to_string()));
    pairs
}

/// M string literal
fn m_string(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// M identifiers that are not plain names need `#"..."` quoting
fn m_field_name(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("#{}", m_string(name))
    }
}

pub fn generate_m_code(kind: PowerQueryKind, params: &PowerQueryParams, base_url: &str) -> Result<String> {
    params.validate()?;

    let endpoint = format!("{}/api/download", base_url.trim_end_matches('/'));
    let query = query_pairs(kind, params)
        .iter()
        .map(|(key, value)| format!("{} = {}", m_field_name(key), m_string(value)))
        .collect::<Vec<_>>()
        .join(", ");
    let types = kind
        .columns()
        .iter()
        .map(|(name, ty)| format!("{{{}, {}}}", m_string(name), ty.m_type()))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "// {title}\n\
         let\n    \
             BaseUrl = {endpoint},\n    \
             Source = Csv.Document(\n        \
                 Web.Contents(BaseUrl, [Query = [{query}]]),\n        \
                 [Delimiter = \",\", Encoding = 65001, QuoteStyle = QuoteStyle.Csv]\n    \
             ),\n    \
             Promoted = Table.PromoteHeaders(Source, [PromoteAllScalars = true]),\n    \
             Typed = Table.TransformColumnTypes(Promoted, {{{types}}}, \"en-US\")\n\
         in\n    \
             Typed\n",
        title = kind.title(),
        endpoint = m_string(&endpoint),
        query = query,
        types = types,
    ))
}

/// Human-readable setup instructions for the Setup sheet
pub fn setup_steps(kind: PowerQueryKind, params: &PowerQueryParams) -> Vec<String> {
    let mut steps = vec![
        "Open Excel and go to Data > Get Data > From Other Sources > Blank Query.".to_string(),
        "In the Power Query editor choose Home > Advanced Editor.".to_string(),
        "Replace the editor contents with the code on the 'Power Query' sheet and click Done.".to_string(),
        format!("Rename the query to '{}' and choose Close & Load.", kind.title()),
    ];

    match kind {
        PowerQueryKind::Watchlist => steps.push(format!("The watchlist tracks: {}.", params.coins.join(", "))),
        PowerQueryKind::PriceHistory => steps.push(format!(
            "The query loads {} days of daily candles for {}.",
            params.days,
            params.coins.first().map(String::as_str).unwrap_or("btc")
        )),
        PowerQueryKind::FearGreed => steps.push(format!("The query loads the last {} days of the index.", params.days)),
        _ => steps.push(format!("The query loads up to {} rows.", params.limit)),
    }

    steps.push("Use Data > Refresh All to update. Free plans refresh at most once per minute.".to_string());
    steps
}

/// XLSX with a `Setup` sheet and the M code on a `Power Query` sheet
pub fn build_template_workbook(
    kind: PowerQueryKind,
    params: &PowerQueryParams,
    base_url: &str,
    product_name: &str,
) -> Result<Vec<u8>> {
    let code = generate_m_code(kind, params, base_url)?;
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let mono = Format::new().set_font_name("Consolas");

    let setup = workbook.add_worksheet();
    setup.set_name("Setup")?;
    setup.write_string_with_format(0, 0, format!("{} - {}", product_name, kind.title()), &bold)?;
    for (i, step) in setup_steps(kind, params).iter().enumerate() {
        setup.write_string(i as u32 + 2, 0, format!("{}. {}", i + 1, step))?;
    }
    setup.set_column_width(0, 100)?;

    let query = workbook.add_worksheet();
    query.set_name("Power Query")?;
    for (i, line) in code.lines().enumerate() {
        query.write_string_with_format(i as u32, 0, line, &mono)?;
    }
    query.set_column_width(0, 120)?;

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::format::ExportFormat;
    use crate::export::request::ExportRequest;
    use crate::export::{CategoryRegistry, ExportSources};
    use crate::providers::fixture::FixtureProvider;
    use std::sync::Arc;

    #[test]
    fn test_params_validation() {
        assert!(PowerQueryParams::from_raw(None, None, None).is_ok());
        assert!(PowerQueryParams::from_raw(Some("btc,eth,usd-coin"), Some("250"), Some("365")).is_ok());
        assert!(PowerQueryParams::from_raw(Some("BTC"), None, None).is_err());
        assert!(PowerQueryParams::from_raw(Some("btc;drop"), None, None).is_err());
        assert!(PowerQueryParams::from_raw(None, Some("0"), None).is_err());
        assert!(PowerQueryParams::from_raw(None, Some("1001"), None).is_err());
        assert!(PowerQueryParams::from_raw(None, None, Some("366")).is_err());
        assert!(PowerQueryParams::from_raw(None, Some("ten"), None).is_err());

        let many = (0..51).map(|i| format!("c{}", i)).collect::<Vec<_>>().join(",");
        assert!(PowerQueryParams::from_raw(Some(&many), None, None).is_err());
    }

    #[test]
    fn test_m_code_targets_csv_export() {
        let code = generate_m_code(
            PowerQueryKind::PriceHistory,
            &PowerQueryParams::from_raw(Some("eth"), None, Some("90")).unwrap(),
            "https://sheets.example.com/",
        )
        .unwrap();

        assert!(code.contains("BaseUrl = \"https://sheets.example.com/api/download\""));
        assert!(code.contains("category = \"historical_prices\""));
        assert!(code.contains("symbol = \"ETH\""));
        assert!(code.contains("limit = \"90\""));
        assert!(code.contains("format = \"csv\""));
        assert!(code.contains("excel = \"true\""));
        assert!(code.contains("{\"close\", type number}"));
        assert!(code.trim_end().ends_with("Typed"));
    }

    #[test]
    fn test_reserved_query_key_is_quoted() {
        let code = generate_m_code(PowerQueryKind::GainersLosers, &PowerQueryParams::default(), "https://x").unwrap();
        assert!(code.contains("#\"type\" = \"both\""));
    }

    #[test]
    fn test_setup_steps_mention_params() {
        let params = PowerQueryParams::from_raw(Some("btc,doge"), None, None).unwrap();
        let steps = setup_steps(PowerQueryKind::Watchlist, &params);
        assert!(steps.iter().any(|s| s.contains("btc, doge")));
        assert!(steps.len() >= 5);
    }

    #[test]
    fn test_template_workbook_is_xlsx() {
        let bytes = build_template_workbook(
            PowerQueryKind::FearGreed,
            &PowerQueryParams::default(),
            "https://x",
            "CryptoSheets",
        )
        .unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn test_template_columns_exist_in_exported_rows() {
        let registry = CategoryRegistry::new();
        let sources = ExportSources {
            provider: Arc::new(FixtureProvider::new()),
            cache: None,
        };

        for kind in PowerQueryKind::ALL {
            let request = ExportRequest::new(kind.category(), ExportFormat::Csv);
            let handler = registry.get(kind.category()).unwrap();
            let rows = (handler.fetch)(&sources, &request).await.unwrap();
            for (column, _) in kind.columns() {
                assert!(rows[0].contains_key(*column), "{} missing {}", kind.as_str(), column);
            }
        }
    }
}
