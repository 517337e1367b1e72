//! `GET /api/download`

use super::{client_ip, public_base_url};
use crate::error::Result;
use crate::events::{log_download_event, DownloadEvent};
use crate::export::gate::is_download_category_enabled;
use crate::export::projection::apply_field_selection;
use crate::export::request::{parse_category, parse_format};
use crate::export::serialize::{self, ExportMetadata, PREVIEW_ROWS};
use crate::export::{Category, DownloadQuery, ExportFormat, ExportRequest, InvalidParameter, Row};
use crate::identity::{resolve_tier_from_bearer_token, Tier};
use crate::ratelimit::{self, RateLimitDecision};
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

const NO_STORE: &str = "no-store";
const EXCEL_CACHE: &str = "public, s-maxage=30, stale-while-revalidate=300";
const RATE_LIMITED_CACHE: &str = "public, max-age=5";
const IQY_CACHE: &str = "public, s-maxage=86400";

fn invalid<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn export_failed(category: Category) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": format!(
                "Failed to export {} data. Please try again or choose a different category.",
                category.as_str()
            ),
        })),
    )
        .into_response()
}

fn set_header(response: &mut Response, name: header::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response.headers_mut().insert(name, value);
        }
        Err(e) => warn!("Dropping invalid {} header value: {}", name, e),
    }
}

fn attachment(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", file_name)
}

fn rate_limited(decision: RateLimitDecision, excel_tier: Option<Tier>) -> Response {
    let mut body = json!({
        "error": "Too many requests. Please wait before downloading again.",
        "retryAfterSeconds": decision.retry_after_seconds,
    });
    let min_refresh = excel_tier.map(|tier| ratelimit::min_interval_for_tier(tier).as_secs());
    if let (Some(tier), Some(min_refresh)) = (excel_tier, min_refresh) {
        body["tier"] = json!(tier.as_str());
        body["minRefreshSeconds"] = json!(min_refresh);
    }

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    set_header(&mut response, header::RETRY_AFTER, &decision.retry_after_seconds.to_string());
    set_header(&mut response, header::CACHE_CONTROL, RATE_LIMITED_CACHE);
    if let Some(min_refresh) = min_refresh {
        set_header(
            &mut response,
            header::HeaderName::from_static("x-min-refresh-seconds"),
            &min_refresh.to_string(),
        );
    }
    response
}

/// Filter parameters as sent, for the event log
fn filters_of(query: &DownloadQuery) -> Map<String, Value> {
    let pairs = [
        ("fields", &query.fields),
        ("symbols", &query.symbols),
        ("coinCategory", &query.coin_category),
        ("sortBy", &query.sort_by),
        ("minMarketCap", &query.min_market_cap),
        ("symbol", &query.symbol),
        ("interval", &query.interval),
        ("limit", &query.limit),
        ("depth", &query.depth),
        ("type", &query.rank_type),
        ("filter", &query.filter),
        ("chain", &query.chain),
    ];
    pairs
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), Value::String(v.clone()))))
        .collect()
}

fn serialize_rows(
    format: ExportFormat,
    rows: &[Row],
    metadata: &ExportMetadata,
    product_name: &str,
) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => serialize::to_csv(rows),
        ExportFormat::Xlsx => serialize::to_xlsx(rows, metadata, product_name),
        ExportFormat::Json | ExportFormat::Iqy => serialize::to_json(rows, metadata),
    }
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    query: std::result::Result<Query<DownloadQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return invalid(InvalidParameter {
                error: format!("Invalid query string: {}", rejection.body_text()),
                value: raw_query.unwrap_or_default(),
                allowed: Vec::new(),
            })
        }
    };

    let format = match parse_format(query.format.as_deref()) {
        Ok(format) => format,
        Err(e) => return invalid(e),
    };

    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let excel = query.is_excel();

    // Excel refreshes are throttled per tier; everything else per category and format
    let tier = if excel {
        Some(resolve_tier_from_bearer_token(&headers, state.identity.as_deref()).await)
    } else {
        None
    };
    let (key, min_interval) = match tier {
        Some(tier) => (ratelimit::excel_key(tier, &ip, &query), ratelimit::min_interval_for_tier(tier)),
        None => {
            let category_raw = query.category.as_deref().unwrap_or(Category::MarketOverview.as_str());
            (ratelimit::download_key(&ip, category_raw, format), ratelimit::DOWNLOAD_MIN_INTERVAL)
        }
    };

    match state.rate_limiter.enforce_min_interval(&key, min_interval).await {
        Ok(decision) if !decision.ok => {
            debug!("Rate limited {} for {}s", key, decision.retry_after_seconds);
            return rate_limited(decision, tier);
        }
        Ok(_) => {}
        Err(e) => warn!("Rate limit store unavailable, allowing request: {}", e),
    }

    let category = match parse_category(query.category.as_deref()) {
        Ok(category) => category,
        Err(e) => return invalid(e),
    };

    if !is_download_category_enabled(&state.config.features, category) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": format!("The {} category is temporarily unavailable.", category.as_str()),
                "category": category.as_str(),
                "disabled": true,
            })),
        )
            .into_response();
    }

    let request = match ExportRequest::from_query(&query, category, format) {
        Ok(request) => request,
        Err(e) => return invalid(e),
    };

    // Previews are logged as the JSON they return
    let logged_format = if request.preview && format != ExportFormat::Iqy {
        ExportFormat::Json.as_str()
    } else {
        format.as_str()
    };
    let event = |file_name: String, row_count: Option<usize>| DownloadEvent {
        client_ip: ip.clone(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        category: category.as_str().to_string(),
        format: logged_format.to_string(),
        file_name,
        row_count,
        filters: filters_of(&query),
        tier,
    };

    // The pointer never depends on preview or excel flags and never fetches
    if format == ExportFormat::Iqy {
        let base_url = public_base_url(&state.config, &headers);
        let url = match serialize::iqy_url(&base_url, raw_query.as_deref()) {
            Ok(url) => url,
            Err(e) => {
                error!("Failed to build IQY pointer for {}: {}", category, e);
                return export_failed(category);
            }
        };

        let file_name = format!("{}.iqy", category.as_str());
        let mut response = (StatusCode::OK, serialize::iqy_body(&url)).into_response();
        set_header(&mut response, header::CONTENT_TYPE, format.content_type());
        set_header(&mut response, header::CONTENT_DISPOSITION, &attachment(&file_name));
        set_header(&mut response, header::CACHE_CONTROL, IQY_CACHE);

        log_download_event(state.db.clone(), event(file_name, None));
        return response;
    }

    let Some(handler) = state.registry.get(category) else {
        error!("No handler registered for {}", category);
        return export_failed(category);
    };

    let mut rows = match (handler.fetch)(&state.sources, &request).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Export of {} failed: {}", category, e);
            return export_failed(category);
        }
    };

    if let Some(fields) = &request.fields {
        rows = apply_field_selection(rows, fields);
    }

    let total = rows.len();
    let mut metadata = ExportMetadata {
        category: category.as_str().to_string(),
        total,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        source: handler.source.to_string(),
        fields: request.fields.clone(),
        excel: excel.then_some(true),
        preview: None,
    };

    if request.preview {
        rows.truncate(PREVIEW_ROWS);
        metadata.preview = Some(true);
        let body = match serialize::to_json(&rows, &metadata) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize {} preview: {}", category, e);
                return export_failed(category);
            }
        };
        let mut response = (StatusCode::OK, body).into_response();
        set_header(&mut response, header::CONTENT_TYPE, ExportFormat::Json.content_type());
        set_header(&mut response, header::CACHE_CONTROL, NO_STORE);
        log_download_event(state.db.clone(), event(format!("{}_preview.json", category.as_str()), Some(total)));
        return response;
    }

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let file_name = format!("{}.{}", (handler.filename)(&request, &today), format.as_str());

    let body = match serialize_rows(format, &rows, &metadata, &state.config.product_name) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize {} as {}: {}", category, format, e);
            return export_failed(category);
        }
    };

    let cache_control = if excel && matches!(format, ExportFormat::Csv | ExportFormat::Json) {
        EXCEL_CACHE
    } else {
        NO_STORE
    };

    let mut response = (StatusCode::OK, body).into_response();
    set_header(&mut response, header::CONTENT_TYPE, format.content_type());
    set_header(&mut response, header::CONTENT_DISPOSITION, &attachment(&file_name));
    set_header(&mut response, header::CACHE_CONTROL, cache_control);

    log_download_event(state.db.clone(), event(file_name, Some(total)));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureFlags, IdentityConfig, ServerConfig};
    use crate::db::sqlite::SqliteDb;
    use crate::providers::fixture::FixtureProvider;
    use crate::server::router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state_with(provider: Arc<FixtureProvider>, features: FeatureFlags) -> Arc<AppState> {
        let config = ServerConfig {
            public_base_url: Some("https://sheets.example.com".to_string()),
            features,
            identity: IdentityConfig::Disabled,
            ..ServerConfig::default()
        };
        let db = Arc::new(SqliteDb::new_in_memory().unwrap());
        Arc::new(AppState::with_parts(config, db, provider, None))
    }

    fn state() -> Arc<AppState> {
        state_with(Arc::new(FixtureProvider::new()), FeatureFlags::default())
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> Response {
        get_from(state, uri, "203.0.113.9").await
    }

    async fn get_from(state: &Arc<AppState>, uri: &str, ip: &str) -> Response {
        router(state.clone())
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("x-forwarded-for", ip)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn header_of<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_invalid_format_rejected_before_fetch() {
        let provider = Arc::new(FixtureProvider::new());
        let state = state_with(provider.clone(), FeatureFlags::default());

        let response = get(&state, "/api/download?format=pdf").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["value"], "pdf");
        assert_eq!(body["allowed"], json!(["xlsx", "csv", "json", "iqy"]));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_category_rejected() {
        let response = get(&state(), "/api/download?category=bogus&format=json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["value"], "bogus");
        assert!(body["allowed"].as_array().unwrap().len() == 33);
    }

    #[tokio::test]
    async fn test_invalid_filter_rejected() {
        let response = get(&state(), "/api/download?category=historical_prices&format=json&interval=7m").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["value"], "7m");
    }

    #[tokio::test]
    async fn test_disabled_group_returns_503() {
        let response = get(&state(), "/api/download?category=news&format=json").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["category"], "news");
        assert_eq!(body["disabled"], true);
    }

    #[tokio::test]
    async fn test_json_export() {
        let response = get(&state(), "/api/download?category=market_overview&format=json&limit=5").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_of(&response, "cache-control"), "no-store");
        assert!(header_of(&response, "content-disposition").contains("market_overview_"));

        let body = json_body(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
        assert_eq!(body["metadata"]["total"], 5);
        assert_eq!(body["metadata"]["source"], "CoinGecko");
    }

    #[tokio::test]
    async fn test_csv_export_with_field_selection() {
        let response = get(
            &state(),
            "/api/download?category=historical_prices&format=csv&symbol=ETH&limit=3&fields=close,date,bogus",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_of(&response, "content-type"), "text/csv; charset=utf-8");
        assert_eq!(
            header_of(&response, "content-disposition"),
            "attachment; filename=\"historical_prices_ETH_1d.csv\""
        );

        let body = text_body(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "close,date");
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn test_preview_forces_json_and_keeps_total() {
        let response = get(&state(), "/api/download?category=market_overview&format=xlsx&preview=true").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_of(&response, "content-type"), "application/json");

        let body = json_body(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 10);
        assert_eq!(body["metadata"]["total"], 12);
        assert_eq!(body["metadata"]["preview"], true);
    }

    #[tokio::test]
    async fn test_xlsx_export() {
        let response = get(&state(), "/api/download?category=fear_greed").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_of(&response, "content-type"), crate::export::format::XLSX_CONTENT_TYPE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn test_iqy_never_fetches() {
        let provider = Arc::new(FixtureProvider::new());
        let state = state_with(provider.clone(), FeatureFlags::default());

        let response = get(&state, "/api/download?category=order_book&format=iqy&symbol=ETH").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_of(&response, "cache-control"), "public, s-maxage=86400");
        assert_eq!(
            header_of(&response, "content-disposition"),
            "attachment; filename=\"order_book.iqy\""
        );

        let body = text_body(response).await;
        assert!(body.starts_with("WEB\n1\nhttps://sheets.example.com/api/download?"));
        assert!(body.contains("symbol=ETH"));
        assert!(body.contains("format=csv"));
        assert!(body.contains("excel=true"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_iqy_ignores_preview_and_excel_flags() {
        let provider = Arc::new(FixtureProvider::new());
        let state = state_with(provider.clone(), FeatureFlags::default());

        let response = get(
            &state,
            "/api/download?category=market_overview&format=iqy&preview=true&excel=false&limit=25",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_of(&response, "content-type"), ExportFormat::Iqy.content_type());

        let body = text_body(response).await;
        assert!(body.starts_with("WEB\n1\nhttps://sheets.example.com/api/download?"));
        assert!(body.contains("limit=25"));
        assert!(!body.contains("preview"));
        assert!(body.contains("excel=true"));
        assert!(!body.contains("excel=false"));
        assert_eq!(provider.calls(), 0);

        let mut events = Vec::new();
        for _ in 0..50 {
            events = state.db.recent_download_events(5).unwrap();
            if !events.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(events[0].format, "iqy");
        assert_eq!(events[0].row_count, None);
    }

    #[tokio::test]
    async fn test_small_limit_does_not_shrink_shared_market_snapshot() {
        let provider = Arc::new(FixtureProvider::new());
        let state = state_with(provider.clone(), FeatureFlags::default());
        let rows = |body: Value| body["data"].as_array().unwrap().len();

        let first = get_from(&state, "/api/download?category=market_overview&format=json&limit=2", "198.51.100.1").await;
        assert_eq!(rows(json_body(first).await), 2);
        assert_eq!(provider.calls(), 1);

        let second = get_from(&state, "/api/download?category=market_overview&format=json", "198.51.100.2").await;
        assert_eq!(rows(json_body(second).await), 12);
        assert_eq!(provider.calls(), 1);

        let third = get_from(
            &state,
            "/api/download?category=market_overview&format=json&symbols=DOGE,DOT",
            "198.51.100.3",
        )
        .await;
        let body = json_body(third).await;
        assert_eq!(rows(body.clone()), 2);
        assert_eq!(body["data"][0]["symbol"], "DOGE");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_query_gets_json_400() {
        let provider = Arc::new(FixtureProvider::new());
        let state = state_with(provider.clone(), FeatureFlags::default());

        let response = get(&state, "/api/download?category=trending&format=csv&format=json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(header_of(&response, "content-type"), "application/json");

        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query string"));
        assert_eq!(body["value"], "category=trending&format=csv&format=json");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_download_rate_limited() {
        let state = state();
        let uri = "/api/download?category=trending&format=json";
        assert_eq!(get(&state, uri).await.status(), StatusCode::OK);

        let response = get(&state, uri).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_of(&response, "retry-after"), "1");
        assert_eq!(header_of(&response, "cache-control"), "public, max-age=5");
        assert!(response.headers().get("x-min-refresh-seconds").is_none());
        assert_eq!(json_body(response).await["retryAfterSeconds"], 1);

        // other format is a different key
        assert_eq!(
            get(&state, "/api/download?category=trending&format=csv").await.status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_excel_mode_uses_tier_interval() {
        let state = state();
        let uri = "/api/download?category=market_overview&format=csv&excel=true";
        let response = get(&state, uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_of(&response, "cache-control"),
            "public, s-maxage=30, stale-while-revalidate=300"
        );

        let response = get(&state, uri).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_of(&response, "x-min-refresh-seconds"), "60");
        let body = json_body(response).await;
        assert_eq!(body["tier"], "free");
        assert_eq!(body["minRefreshSeconds"], 60);
        assert!(body["retryAfterSeconds"].as_u64().unwrap() >= 59);
    }

    #[tokio::test]
    async fn test_upstream_failure_returns_500() {
        let provider = Arc::new(FixtureProvider::new());
        provider.set_failing(true);
        let state = state_with(provider, FeatureFlags::default());

        let response = get(&state, "/api/download?category=order_book&format=json").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["error"],
            "Failed to export order_book data. Please try again or choose a different category."
        );
    }

    #[tokio::test]
    async fn test_download_event_logged() {
        let state = state();
        let response = get(&state, "/api/download?category=dominance&format=json").await;
        assert_eq!(response.status(), StatusCode::OK);

        let mut events = Vec::new();
        for _ in 0..50 {
            events = state.db.recent_download_events(5).unwrap();
            if !events.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "dominance");
        assert_eq!(events[0].client_ip, "203.0.113.9");
    }
}
