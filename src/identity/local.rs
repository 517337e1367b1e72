//! Identity backed by the local `user_sessions` / `user_profiles` tables

use super::IdentityBackend;
use crate::db::sqlite::SqliteDb;
use crate::error::Result;
use crate::security::hash_token;
use async_trait::async_trait;
use std::sync::Arc;

pub struct LocalIdentity {
    db: Arc<SqliteDb>,
}

impl LocalIdentity {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityBackend for LocalIdentity {
    async fn user_for_token(&self, token: &str) -> Result<Option<String>> {
        self.db
            .session_user(&hash_token(token), chrono::Utc::now().timestamp_millis())
    }

    async fn subscription_tier(&self, user_id: &str) -> Result<Option<String>> {
        self.db.subscription_tier(user_id)
    }
}
