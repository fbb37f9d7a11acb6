// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-local stand-in for the shared remote store.
//!
//! Used when no remote endpoint is configured and as the healthy baseline in
//! tests. Honors per-key TTL against an injectable [`Clock`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::traits::{namespace_prefix, RemoteError, RemoteStore};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct StoredDocument {
    body: String,
    expires_at: Option<Instant>,
}

pub struct InMemoryRemoteStore {
    data: DashMap<String, StoredDocument>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: DashMap::new(),
            clock,
        }
    }

    /// Number of stored documents, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw document for a fully qualified key (test inspection).
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|d| d.body.clone())
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError> {
        let now = self.clock.now();
        if let Some(doc) = self.data.get(key) {
            match doc.expires_at {
                Some(at) if now >= at => {}
                _ => return Ok(Some(doc.body.clone())),
            }
        }
        // Expired (or absent); the read guard is released before removal
        self.data.remove_if(key, |_, doc| doc.expires_at.is_some_and(|at| now >= at));
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), RemoteError> {
        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        self.data.insert(
            key.to_string(),
            StoredDocument {
                body: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<(), RemoteError> {
        self.data.remove(key);
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), RemoteError> {
        let prefix = namespace_prefix(namespace);
        self.data.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.data.len();
        self.data.retain(|_, doc| doc.expires_at.map_or(true, |at| now < at));
        before.saturating_sub(self.data.len())
    }
}
