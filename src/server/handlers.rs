//! Catalogue, template, action-token and health handlers

use super::public_base_url;
use crate::error::AppError;
use crate::excel::{build_template_workbook, generate_m_code, PowerQueryKind, PowerQueryParams};
use crate::export::format::XLSX_CONTENT_TYPE;
use crate::export::gate::is_download_category_enabled;
use crate::export::Category;
use crate::identity::bearer_token;
use crate::security::{issue_action_token, ActionKind};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "message": format!("{} API is running", state.config.product_name),
    }))
}

// ============================================================================
// Category Catalogue
// ============================================================================

/// `GET /api/download/categories`
pub async fn list_categories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let categories: Vec<_> = Category::ALL
        .iter()
        .map(|category| {
            json!({
                "id": category.as_str(),
                "group": category.group().as_str(),
                "source": state.registry.get(*category).map(|h| h.source),
                "enabled": is_download_category_enabled(&state.config.features, *category),
            })
        })
        .collect();

    Json(json!({ "categories": categories }))
}

// ============================================================================
// Power Query Templates
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PowerQueryQuery {
    pub dashboard: Option<String>,
    pub coins: Option<String>,
    pub limit: Option<String>,
    pub days: Option<String>,
    pub format: Option<String>,
}

/// `GET /api/templates/power-query`
pub async fn power_query_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PowerQueryQuery>,
) -> Response {
    let raw_kind = query.dashboard.as_deref().unwrap_or(PowerQueryKind::MarketOverview.as_str());
    let kind: PowerQueryKind = match raw_kind.parse() {
        Ok(kind) => kind,
        Err(value) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("Invalid dashboard '{}'", value),
                    "value": value,
                    "allowed": PowerQueryKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
                })),
            )
                .into_response();
        }
    };

    let params = match PowerQueryParams::from_raw(query.coins.as_deref(), query.limit.as_deref(), query.days.as_deref()) {
        Ok(params) => params,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let base_url = public_base_url(&state.config, &headers);
    let result = match query.format.as_deref().unwrap_or("m") {
        "m" => generate_m_code(kind, &params, &base_url).map(|code| {
            (
                "text/plain; charset=utf-8",
                format!("{}.pq", kind.as_str()),
                code.into_bytes(),
            )
        }),
        "xlsx" => build_template_workbook(kind, &params, &base_url, &state.config.product_name)
            .map(|bytes| (XLSX_CONTENT_TYPE, format!("{}_power_query.xlsx", kind.as_str()), bytes)),
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid format '{}' (expected m or xlsx)", other),
            )
        }
    };

    match result {
        Ok((content_type, file_name, body)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
                (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
            ],
            body,
        )
            .into_response(),
        Err(AppError::Validation(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(e) => {
            error!("Failed to build {} template: {}", kind.as_str(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build template")
        }
    }
}

// ============================================================================
// Action Tokens
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeActionRequest {
    #[serde(default)]
    pub action: String,
}

/// `POST /api/v1/authorize-action`
pub async fn authorize_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AuthorizeActionRequest>,
) -> Response {
    if !state.config.features.action_tokens {
        return error_response(StatusCode::FORBIDDEN, "Action tokens are disabled");
    }

    let Some(identity) = state.identity.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Identity service is not configured");
    };

    let Some(token) = bearer_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "Missing bearer token");
    };

    let action: ActionKind = match body.action.parse() {
        Ok(action) => action,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let user_id = match identity.user_for_token(token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return error_response(StatusCode::UNAUTHORIZED, "Invalid or expired session"),
        Err(e) => {
            warn!("Token validation failed: {}", e);
            return error_response(StatusCode::UNAUTHORIZED, "Invalid or expired session");
        }
    };

    match issue_action_token(&state.db, &user_id, action) {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(e) => {
            error!("Failed to issue action token: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue action token")
        }
    }
}
