// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the remote tier.
///
/// All variants are absorbed by the fallback layer; they only differ in how
/// they are logged and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("remote document could not be decoded: {0}")]
    Codec(String),
}

impl RemoteError {
    /// Stable label used as the `cause` field in logs and metrics.
    #[must_use]
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Codec(_) => "codec",
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<redis::RedisError> for RemoteError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            // Client-side deadline; the per-call budget is not known here.
            RemoteError::Timeout(Duration::ZERO)
        } else {
            RemoteError::Unavailable(err.to_string())
        }
    }
}

/// Narrow contract the cache layer needs from the shared remote store.
///
/// Values are already-encoded documents. Keys arrive fully qualified
/// (`"{namespace}::{key}"`), so implementations never need to know about
/// cache names except for [`RemoteStore::clear`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError>;

    /// Store `value`; `ttl = None` means no expiry on the remote side.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), RemoteError>;

    async fn evict(&self, key: &str) -> Result<(), RemoteError>;

    /// Remove every key belonging to `namespace`.
    async fn clear(&self, namespace: &str) -> Result<(), RemoteError>;

    /// Liveness probe used for startup checks and health reporting.
    async fn ping(&self) -> Result<(), RemoteError> {
        self.get("__tiered_cache_ping__").await.map(|_| ())
    }

    /// Drop expired documents the store does not expire by itself.
    /// Returns how many were removed.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Build the namespaced key stored on the remote tier.
#[inline]
#[must_use]
pub fn remote_key(namespace: &str, key: &str) -> String {
    format!("{namespace}::{key}")
}

/// Pattern matching every remote key of `namespace`.
#[inline]
#[must_use]
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}::")
}
