//! HTTP API
//!
//! Routes:
//! - `GET /api/download` export pipeline
//! - `GET /api/download/categories` category catalogue
//! - `GET /api/templates/power-query` Power Query templates
//! - `POST /api/v1/authorize-action` single-use action tokens
//! - `GET /health`, `GET /`

mod download;
pub mod handlers;
mod server;

use crate::config::ServerConfig;
use crate::state::AppState;
use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use server::ApiServer;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::health_check))
        .route("/api/download", get(download::download))
        .route("/api/download/categories", get(handlers::list_categories))
        .route("/api/templates/power-query", get(handlers::power_query_template))
        .route("/api/v1/authorize-action", post(handlers::authorize_action))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Externally visible origin for generated links
pub fn public_base_url(config: &ServerConfig, headers: &HeaderMap) -> String {
    if let Some(url) = &config.public_base_url {
        return url.clone();
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let proto = header("x-forwarded-proto")
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .unwrap_or("http");

    match header("x-forwarded-host").or_else(|| header("host")) {
        Some(host) => format!("{}://{}", proto, host),
        None => format!("http://{}:{}", config.host, config.port),
    }
}
