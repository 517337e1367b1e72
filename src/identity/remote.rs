//! Identity backed by a hosted auth REST API
//!
//! `GET {url}/auth/v1/user` validates the bearer token; the tier comes from
//! `GET {url}/rest/v1/profiles?id=eq.{id}&select=subscription_tier`.

use super::IdentityBackend;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    subscription_tier: Option<String>,
}

pub struct RemoteIdentity {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RemoteIdentity {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn profiles_url(&self, user_id: &str) -> String {
        format!(
            "{}/rest/v1/profiles?id=eq.{}&select=subscription_tier",
            self.base_url,
            urlencoding::encode(user_id)
        )
    }
}

#[async_trait]
impl IdentityBackend for RemoteIdentity {
    async fn user_for_token(&self, token: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let user: AuthUser = response.json().await?;
                Ok(Some(user.id))
            }
            status => Err(AppError::Auth(format!("Auth service returned {}", status))),
        }
    }

    async fn subscription_tier(&self, user_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.profiles_url(user_id))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Auth(format!("Profile lookup returned {}", status)));
        }

        let rows: Vec<ProfileRow> = response.json().await?;
        Ok(rows.into_iter().next().and_then(|row| row.subscription_tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_url() {
        let identity = RemoteIdentity::new("https://auth.example.com/", "anon").unwrap();
        assert_eq!(
            identity.profiles_url("a b"),
            "https://auth.example.com/rest/v1/profiles?id=eq.a%20b&select=subscription_tier"
        );
    }

    #[test]
    fn test_profile_row_tolerates_null_tier() {
        let rows: Vec<ProfileRow> = serde_json::from_str(r#"[{"subscription_tier": null}]"#).unwrap();
        assert!(rows[0].subscription_tier.is_none());
    }
}
