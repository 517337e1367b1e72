//! Bearer token to subscription tier
//!
//! Tier lookup only throttles Excel refreshes, so every failure path lands
//! on [`Tier::Free`] instead of failing the request.

mod local;
mod remote;

use crate::error::Result;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Serialize;
use std::str::FromStr;

pub use local::LocalIdentity;
pub use remote::RemoteIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
    Business,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Pro => "pro",
            Tier::Business => "business",
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "pro" => Ok(Tier::Pro),
            "business" => Ok(Tier::Business),
            _ => Err(format!("Unknown tier: {}", s)),
        }
    }
}

/// Session and subscription lookups
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// User id behind a bearer token, `None` when the token is not valid
    async fn user_for_token(&self, token: &str) -> Result<Option<String>>;

    /// Raw subscription tier string from the user's profile
    async fn subscription_tier(&self, user_id: &str) -> Result<Option<String>>;
}

/// Token from `Authorization: Bearer <token>`; `None` for any other shape
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

pub async fn resolve_tier_from_bearer_token(headers: &HeaderMap, backend: Option<&dyn IdentityBackend>) -> Tier {
    let Some(token) = bearer_token(headers) else {
        return Tier::Free;
    };
    let Some(backend) = backend else {
        return Tier::Free;
    };

    let user_id = match backend.user_for_token(token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Tier::Free,
        Err(e) => {
            tracing::warn!("Token validation failed, using free tier: {}", e);
            return Tier::Free;
        }
    };

    match backend.subscription_tier(&user_id).await {
        Ok(Some(raw)) => raw.parse().unwrap_or_else(|e: String| {
            tracing::debug!("{}; using free tier", e);
            Tier::Free
        }),
        Ok(None) => Tier::Free,
        Err(e) => {
            tracing::warn!("Profile lookup failed for {}, using free tier: {}", user_id, e);
            Tier::Free
        }
    }
}
