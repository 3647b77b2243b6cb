//! Distributed cache seam and an in-memory implementation.

pub mod memory;
pub mod tokens;

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::CacheError;

pub use memory::MemoryCache;
pub use tokens::RefreshTokens;

/// Byte-oriented key/value cache with optional per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove a key. Returns whether it was present.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Keys matching a glob pattern (`*` any run, `?` one character).
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}

/// Remove every key matching `pattern`. Returns how many were removed.
///
/// Scan-then-delete: entries written between the scan and the delete
/// survive.
pub async fn remove_matching(cache: &dyn Cache, pattern: &str) -> Result<usize, CacheError> {
    let keys = cache.keys_matching(pattern).await?;
    let mut removed = 0;
    for key in &keys {
        if cache.remove(key).await? {
            removed += 1;
        }
    }
    tracing::debug!(pattern, removed, "Invalidated cache keys");
    Ok(removed)
}

/// Compile a glob pattern into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
