// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis adapter for the remote tier.
//!
//! Documents are stored as plain Redis STRINGs under `"{cache}::{key}"`:
//!
//! ```text
//! frequent::product:42 → {"@type":"shop::Product","value":{"id":42,"name":"widget"}}
//! ```
//!
//! The connection is a [`ConnectionManager`] (automatic reconnect with a
//! bounded retry count) established lazily: a process can start while Redis
//! is down and the first successful call binds the connection. Until then
//! every call fails with [`RemoteError::Unavailable`], which the fallback
//! layer masks.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{cmd, AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::traits::{namespace_prefix, RemoteError, RemoteStore};
use crate::config::RemoteConfig;
use crate::error::CacheError;

/// Keys fetched per SCAN round trip during `clear`.
const SCAN_BATCH: usize = 500;

pub struct RedisRemoteStore {
    client: Client,
    manager_config: ConnectionManagerConfig,
    connection: OnceCell<ConnectionManager>,
    endpoint: String,
}

impl RedisRemoteStore {
    /// Build the adapter without connecting.
    ///
    /// Only a malformed endpoint is an error here; reachability is checked
    /// on first use.
    pub fn new(config: &RemoteConfig) -> Result<Self, CacheError> {
        let url = config.url();
        let client = Client::open(url.as_str())
            .map_err(|e| CacheError::Config(format!("invalid remote endpoint: {e}")))?;

        let timeout = Duration::from_millis(config.command_timeout_ms);
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.max_reconnect_retries)
            .set_connection_timeout(timeout)
            .set_response_timeout(timeout);

        Ok(Self {
            client,
            manager_config,
            connection: OnceCell::new(),
            endpoint: format!("{}:{}", config.host, config.port),
        })
    }

    /// `host:port` of the remote service (without credentials).
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether a connection has been established at least once.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, RemoteError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new_with_config(
                    self.client.clone(),
                    self.manager_config.clone(),
                )
                .await?;
                info!(endpoint = %self.endpoint, "Remote cache connection established");
                Ok::<_, redis::RedisError>(conn)
            })
            .await
            .map_err(RemoteError::from)?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl RemoteStore for RedisRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let mut set = cmd("SET");
        set.arg(key).arg(value);
        if let Some(ttl) = ttl {
            // PX 0 is rejected by Redis
            set.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = set.query_async(&mut conn).await?;
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", namespace_prefix(namespace));
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                removed += keys.len();
                let _: () = conn.del(&keys).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(namespace, removed, "Remote namespace cleared");
        Ok(())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let _: String = cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
