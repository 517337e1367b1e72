//! Short-lived confirmation tokens for destructive account actions
//!
//! A token is bound to one user and one action, lives 90 seconds, and is
//! consumed by the first successful verification.

use super::{generate_token, hash_token};
use crate::db::sqlite::SqliteDb;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ACTION_TOKEN_TTL_MS: i64 = 90_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DeleteAccount,
    RotateApiKey,
    ExportUserData,
    CancelSubscription,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::DeleteAccount,
        ActionKind::RotateApiKey,
        ActionKind::ExportUserData,
        ActionKind::CancelSubscription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DeleteAccount => "delete_account",
            ActionKind::RotateApiKey => "rotate_api_key",
            ActionKind::ExportUserData => "export_user_data",
            ActionKind::CancelSubscription => "cancel_subscription",
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// Plaintext token handed to the client exactly once
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedActionToken {
    pub token: String,
    pub action: ActionKind,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_action_token(db: &SqliteDb, user_id: &str, action: ActionKind) -> Result<IssuedActionToken> {
    issue_action_token_at(db, user_id, action, Utc::now().timestamp_millis())
}

pub fn issue_action_token_at(db: &SqliteDb, user_id: &str, action: ActionKind, now_ms: i64) -> Result<IssuedActionToken> {
    let token = generate_token();
    let expires_at_ms = now_ms + ACTION_TOKEN_TTL_MS;
    db.insert_action_token(user_id, action.as_str(), &hash_token(&token), expires_at_ms)?;

    tracing::info!("Issued {} token for user {}", action.as_str(), user_id);

    Ok(IssuedActionToken {
        token,
        action,
        expires_at: DateTime::from_timestamp_millis(expires_at_ms).unwrap_or_else(Utc::now),
    })
}

/// Consume a token. True only for the first verification of a live token
/// issued to this user for this action.
pub fn verify_action_token(db: &SqliteDb, user_id: &str, token: &str, action: ActionKind) -> Result<bool> {
    verify_action_token_at(db, user_id, token, action, Utc::now().timestamp_millis())
}

pub fn verify_action_token_at(
    db: &SqliteDb,
    user_id: &str,
    token: &str,
    action: ActionKind,
    now_ms: i64,
) -> Result<bool> {
    db.consume_action_token(user_id, action.as_str(), &hash_token(token), now_ms)
}
