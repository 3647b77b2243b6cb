//! Refresh-token entries, keyed `{account_id}_refresh_token`.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::Cache;
use crate::error::CacheError;

/// Refresh tokens live for one day.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn refresh_token_key(account_id: Uuid) -> String {
    format!("{account_id}_refresh_token")
}

/// Store of the current refresh token per account.
#[derive(Clone)]
pub struct RefreshTokens {
    cache: Arc<dyn Cache>,
}

impl RefreshTokens {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    pub async fn store(&self, account_id: Uuid, token: &str) -> Result<(), CacheError> {
        self.cache
            .set(
                &refresh_token_key(account_id),
                token.as_bytes().to_vec(),
                Some(REFRESH_TOKEN_TTL),
            )
            .await
    }

    pub async fn get(&self, account_id: Uuid) -> Result<Option<String>, CacheError> {
        let bytes = self.cache.get(&refresh_token_key(account_id)).await?;
        Ok(bytes.and_then(|b| String::from_utf8(b).ok()))
    }

    /// Whether `token` is the account's current refresh token.
    pub async fn matches(&self, account_id: Uuid, token: &str) -> Result<bool, CacheError> {
        Ok(self.get(account_id).await?.as_deref() == Some(token))
    }

    /// Drop the account's refresh token. Returns whether one existed.
    pub async fn revoke(&self, account_id: Uuid) -> Result<bool, CacheError> {
        self.cache.remove(&refresh_token_key(account_id)).await
    }
}
