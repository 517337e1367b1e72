//! Server configuration
//!
//! Everything is read once at process start from `CRYPTOSHEETS_*`
//! environment variables, falling back to compiled defaults. The feature
//! flag table is static for the lifetime of the process.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE: &str = "cryptosheets.db";
const DEFAULT_PRODUCT_NAME: &str = "CryptoSheets";

/// Static switches for whole category groups and optional endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Social sentiment and news categories
    pub social_data: bool,
    /// DeFi aggregator backed categories
    pub defi_data: bool,
    /// Explorer and whale labelling categories
    pub whale_data: bool,
    /// NFT categories
    pub nft_data: bool,
    /// `POST /api/v1/authorize-action`
    pub action_tokens: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            social_data: false,
            defi_data: true,
            whale_data: false,
            nft_data: false,
            action_tokens: true,
        }
    }
}

/// API keys for upstream providers that require one
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub coingecko: Option<String>,
    pub cryptopanic: Option<String>,
    pub lunarcrush: Option<String>,
    pub whale_alert: Option<String>,
    pub etherscan: Option<String>,
}

/// Which identity/subscription store backs tier resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityConfig {
    Disabled,
    /// Sessions and profiles in the local SQLite database
    Local,
    /// Hosted auth REST API
    Remote { url: String, api_key: String },
}

/// Where rate-limit timestamps live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Sqlite,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Externally visible base URL used in IQY files and Power Query templates
    pub public_base_url: Option<String>,
    pub product_name: String,
    pub features: FeatureFlags,
    pub providers: ProviderKeys,
    pub identity: IdentityConfig,
    pub rate_limit_backend: RateLimitBackend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_path: PathBuf::from(DEFAULT_DATABASE),
            public_base_url: None,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            features: FeatureFlags::default(),
            providers: ProviderKeys::default(),
            identity: IdentityConfig::Local,
            rate_limit_backend: RateLimitBackend::Memory,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        let default_flags = FeatureFlags::default();

        let port = match get("CRYPTOSHEETS_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| AppError::Config(format!("Invalid CRYPTOSHEETS_PORT '{}': {}", raw, e)))?,
            None => defaults.port,
        };

        let flag = |name: &str, default: bool| -> Result<bool> {
            match get(name) {
                Some(raw) => parse_bool(name, &raw),
                None => Ok(default),
            }
        };

        let features = FeatureFlags {
            social_data: flag("CRYPTOSHEETS_FEATURE_SOCIAL", default_flags.social_data)?,
            defi_data: flag("CRYPTOSHEETS_FEATURE_DEFI", default_flags.defi_data)?,
            whale_data: flag("CRYPTOSHEETS_FEATURE_WHALE", default_flags.whale_data)?,
            nft_data: flag("CRYPTOSHEETS_FEATURE_NFT", default_flags.nft_data)?,
            action_tokens: flag("CRYPTOSHEETS_FEATURE_ACTION_TOKENS", default_flags.action_tokens)?,
        };

        let identity = match get("CRYPTOSHEETS_IDENTITY").as_deref() {
            None | Some("local") => IdentityConfig::Local,
            Some("none") | Some("disabled") => IdentityConfig::Disabled,
            Some("remote") => {
                let url = get("CRYPTOSHEETS_IDENTITY_URL").ok_or_else(|| {
                    AppError::Config("CRYPTOSHEETS_IDENTITY_URL is required for remote identity".to_string())
                })?;
                let api_key = get("CRYPTOSHEETS_IDENTITY_API_KEY").ok_or_else(|| {
                    AppError::Config("CRYPTOSHEETS_IDENTITY_API_KEY is required for remote identity".to_string())
                })?;
                IdentityConfig::Remote {
                    url: url.trim_end_matches('/').to_string(),
                    api_key,
                }
            }
            Some(other) => {
                return Err(AppError::Config(format!(
                    "Unknown CRYPTOSHEETS_IDENTITY '{}' (expected local, remote or none)",
                    other
                )))
            }
        };

        let rate_limit_backend = match get("CRYPTOSHEETS_RATE_LIMIT_STORE").as_deref() {
            None | Some("memory") => RateLimitBackend::Memory,
            Some("sqlite") => RateLimitBackend::Sqlite,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "Unknown CRYPTOSHEETS_RATE_LIMIT_STORE '{}' (expected memory or sqlite)",
                    other
                )))
            }
        };

        Ok(Self {
            host: get("CRYPTOSHEETS_HOST").unwrap_or(defaults.host),
            port,
            database_path: get("CRYPTOSHEETS_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            public_base_url: get("CRYPTOSHEETS_PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            product_name: get("CRYPTOSHEETS_PRODUCT_NAME").unwrap_or(defaults.product_name),
            features,
            providers: ProviderKeys {
                coingecko: get("COINGECKO_API_KEY"),
                cryptopanic: get("CRYPTOPANIC_API_KEY"),
                lunarcrush: get("LUNARCRUSH_API_KEY"),
                whale_alert: get("WHALE_ALERT_API_KEY"),
                etherscan: get("ETHERSCAN_API_KEY"),
            },
            identity,
            rate_limit_backend,
        })
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("Invalid boolean for {}: '{}'", name, raw))),
    }
}
