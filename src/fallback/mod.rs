// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered fallback cache.
//!
//! One logical cache composed of a shared remote tier and an in-process
//! local tier. The remote tier is authoritative while it answers; any remote
//! failure (timeout, connection loss, undecodable document, open circuit) is
//! logged, counted and turned into a local-tier lookup. Callers never see a
//! remote error.
//!
//! ```text
//!   get ──► remote ──hit──► value
//!             │
//!        miss / failure
//!             ▼
//!           local ──hit──► value
//!             │
//!            miss ──► None            (get)
//!                 ──► loader()        (get_or_load)
//!                       │
//!                       ├─► local.put   (always)
//!                       └─► remote.put  (best effort)
//! ```
//!
//! Writes go remote-then-local for `put`, and local-then-remote after a
//! load. No cross-tier read-after-write guarantee exists for one key under
//! concurrent mutation.

mod single_flight;
mod types;

pub use types::TieredStats;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backpressure::MemoryBudget;
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::error::CacheError;
use crate::local::{LocalCacheEngine, LocalPolicy};
use crate::metrics::LatencyTimer;
use crate::policy::NamedCachePolicy;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitError};
use crate::storage::traits::{remote_key, RemoteError, RemoteStore};

use single_flight::KeyLocks;
use types::{RemoteRead, TierCounters};

/// Value representation of the local tier: the caller's value, untouched.
pub type LocalValue = Arc<dyn Any + Send + Sync>;

/// Construction options shared by every cache of a registry.
#[derive(Clone)]
pub struct FallbackOptions {
    /// Deadline of every remote call
    pub remote_timeout: Duration,
    /// Build a local tier (without it, remote failures surface as misses)
    pub local_enabled: bool,
    /// Collapse concurrent `get_or_load` misses of one key
    pub single_flight: bool,
    /// Shared breaker in front of the remote tier
    pub breaker: Option<Arc<CircuitBreaker>>,
    pub clock: Arc<dyn Clock>,
    pub budget: Arc<MemoryBudget>,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(3),
            local_enabled: true,
            single_flight: false,
            breaker: None,
            clock: Arc::new(SystemClock),
            budget: Arc::new(MemoryBudget::new(0)),
        }
    }
}

impl std::fmt::Debug for FallbackOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOptions")
            .field("remote_timeout", &self.remote_timeout)
            .field("local_enabled", &self.local_enabled)
            .field("single_flight", &self.single_flight)
            .field("breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .finish_non_exhaustive()
    }
}

/// A named cache over a remote and a local tier.
///
/// Values written through the remote tier must be `Serialize` +
/// `DeserializeOwned`; the local tier keeps the value itself, so reading a
/// key back as a different type is a miss rather than an error.
pub struct TieredFallbackCache {
    name: String,
    policy: NamedCachePolicy,
    remote: Arc<dyn RemoteStore>,
    local: Option<LocalCacheEngine<LocalValue>>,
    remote_timeout: Duration,
    breaker: Option<Arc<CircuitBreaker>>,
    key_locks: Option<KeyLocks>,
    counters: TierCounters,
}

impl TieredFallbackCache {
    pub fn new(policy: NamedCachePolicy, remote: Arc<dyn RemoteStore>, options: FallbackOptions) -> Self {
        let local = options.local_enabled.then(|| {
            LocalCacheEngine::new(
                policy.name.clone(),
                LocalPolicy::from(&policy),
                options.clock.clone(),
                options.budget.clone(),
            )
        });

        Self {
            name: policy.name.clone(),
            policy,
            remote,
            local,
            remote_timeout: options.remote_timeout,
            breaker: options.breaker,
            key_locks: options.single_flight.then(KeyLocks::new),
            counters: TierCounters::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy(&self) -> &NamedCachePolicy {
        &self.policy
    }

    /// The local tier, if configured.
    #[must_use]
    pub fn local(&self) -> Option<&LocalCacheEngine<LocalValue>> {
        self.local.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Cache operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read `key`: remote first, local when the remote misses or fails.
    ///
    /// A remote hit is returned without touching the local tier.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        match self.remote_get::<T>(key).await {
            RemoteRead::Hit(value) => Some(value),
            RemoteRead::Miss | RemoteRead::Failed => self.local_get(key),
        }
    }

    /// Read `key`, running `loader` when neither tier has it.
    ///
    /// Loader errors are returned verbatim. A produced value is written to
    /// the local tier, then to the remote tier; a failed remote write does
    /// not fail the call. A local write failure is converted into `E`.
    ///
    /// Unless single-flight is enabled, concurrent misses each run their
    /// own loader.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use tiered_cache::{TieredFallbackCache, CacheError};
    /// # #[derive(Debug)] struct DbError;
    /// # impl From<CacheError> for DbError { fn from(_: CacheError) -> Self { DbError } }
    /// # async fn fetch_name(id: u64) -> Result<String, DbError> { Ok(String::new()) }
    /// # async fn example(cache: &TieredFallbackCache) -> Result<(), DbError> {
    /// let name: String = cache
    ///     .get_or_load("product:42", || fetch_name(42))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }

        let Some(locks) = &self.key_locks else {
            return self.load_and_store(key, loader).await;
        };

        let _guard = locks.acquire(key).await;
        // Whoever held the lock before us may have produced the value
        let rechecked = match &self.local {
            Some(_) => self.local_get_quiet::<T>(key),
            None => match self.remote_get::<T>(key).await {
                RemoteRead::Hit(value) => Some(value),
                _ => None,
            },
        };
        if let Some(value) = rechecked {
            self.counters.coalesced_load();
            crate::metrics::record_coalesced_load(&self.name);
            return Ok(value);
        }
        self.load_and_store(key, loader).await
    }

    /// Write-through: remote (best effort), then local.
    ///
    /// A value that cannot be encoded is cached locally only, and the remote
    /// copy of `key` is evicted so reads stop preferring the previous value.
    ///
    /// Remote documents are tagged with the written Rust type: a value put
    /// as `&str` is not readable as `String`. Pass owned values.
    pub async fn put<T>(&self, key: &str, value: T) -> Result<(), CacheError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let document = self.encode_for_remote(key, &value);
        match &document {
            Some(document) => self.remote_put(key, document).await,
            None => self.remote_evict(key).await,
        }
        self.local_put(key, value, document.as_ref().map(String::len))
    }

    /// Remove `key` from both tiers. The remote leg is best effort.
    pub async fn evict(&self, key: &str) {
        self.remote_evict(key).await;
        if let Some(local) = &self.local {
            local.evict(key);
        }
    }

    /// Remove every entry of this cache from both tiers. The remote leg is
    /// best effort.
    pub async fn clear(&self) {
        let remote = self.remote.clone();
        let namespace = self.name.clone();
        if self
            .remote_call("clear", "*", || async move { remote.clear(&namespace).await })
            .await
            .is_err()
        {
            self.counters.remote_write_failure();
        }
        if let Some(local) = &self.local {
            local.clear();
        }
    }

    #[must_use]
    pub fn stats(&self) -> TieredStats {
        self.counters
            .snapshot(&self.name, self.local.as_ref().map(LocalCacheEngine::stats))
    }

    /// Drop expired local entries.
    pub fn purge_expired(&self) -> usize {
        self.local.as_ref().map_or(0, LocalCacheEngine::purge_expired)
    }

    /// Reclaim local entries if this cache's class allows it at the current
    /// memory pressure.
    pub fn reclaim(&self) -> usize {
        self.local.as_ref().map_or(0, LocalCacheEngine::reclaim)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════════

    async fn load_and_store<T, E, F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + Send + Sync + Clone + 'static,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.counters.load();
        let value = match loader().await {
            Ok(value) => value,
            Err(e) => {
                self.counters.load_failure();
                crate::metrics::record_load(&self.name, "failure");
                error!(cache = %self.name, key, "Loader failed, returning its error to the caller");
                return Err(e);
            }
        };
        crate::metrics::record_load(&self.name, "success");

        let document = self.encode_for_remote(key, &value);
        self.local_put(key, value.clone(), document.as_ref().map(String::len))
            .map_err(E::from)?;
        if let Some(document) = &document {
            self.remote_put(key, document).await;
        }
        Ok(value)
    }

    async fn remote_get<T: DeserializeOwned>(&self, key: &str) -> RemoteRead<T> {
        let remote = self.remote.clone();
        let full_key = remote_key(&self.name, key);
        let document = match self
            .remote_call("get", key, || async move { remote.get(&full_key).await })
            .await
        {
            Ok(Some(document)) => document,
            Ok(None) => {
                self.counters.remote_miss();
                crate::metrics::record_operation(&self.name, "remote", "get", "miss");
                return RemoteRead::Miss;
            }
            Err(_) => return RemoteRead::Failed,
        };

        match codec::decode::<T>(&document) {
            Ok(value) => {
                self.counters.remote_hit();
                crate::metrics::record_operation(&self.name, "remote", "get", "hit");
                debug!(cache = %self.name, key, "Remote tier hit");
                RemoteRead::Hit(value)
            }
            Err(e) => {
                self.record_remote_failure("get", key, &e);
                RemoteRead::Failed
            }
        }
    }

    async fn remote_put(&self, key: &str, document: &str) {
        let remote = self.remote.clone();
        let full_key = remote_key(&self.name, key);
        let document = document.to_string();
        let ttl = self.policy.effective_remote_ttl();
        if self
            .remote_call("put", key, || async move { remote.put(&full_key, &document, ttl).await })
            .await
            .is_err()
        {
            self.counters.remote_write_failure();
        }
    }

    async fn remote_evict(&self, key: &str) {
        let remote = self.remote.clone();
        let full_key = remote_key(&self.name, key);
        if self
            .remote_call("evict", key, || async move { remote.evict(&full_key).await })
            .await
            .is_err()
        {
            self.counters.remote_write_failure();
        }
    }

    /// Bound a remote call by the deadline and the optional breaker, and
    /// account for its failure. The error is for control flow only.
    async fn remote_call<T, F, Fut>(&self, operation: &'static str, key: &str, call: F) -> Result<T, RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let _timer = LatencyTimer::new("remote", operation);
        let deadline = self.remote_timeout;
        let bounded = move || async move {
            match tokio::time::timeout(deadline, call()).await {
                Ok(Err(RemoteError::Timeout(_))) | Err(_) => Err(RemoteError::Timeout(deadline)),
                Ok(result) => result,
            }
        };

        let result = match &self.breaker {
            Some(breaker) => breaker.call(bounded).await.map_err(|e| match e {
                CircuitError::Rejected => RemoteError::Unavailable("circuit open".to_string()),
                CircuitError::Inner(e) => e,
            }),
            None => bounded().await,
        };

        if let Err(e) = &result {
            self.record_remote_failure(operation, key, e);
        }
        result
    }

    fn record_remote_failure(&self, operation: &'static str, key: &str, err: &RemoteError) {
        self.counters.remote_failure(err);
        crate::metrics::record_remote_failure(&self.name, operation, err.cause());
        warn!(
            cache = %self.name,
            key,
            operation,
            cause = err.cause(),
            error = %err,
            "Remote cache call failed, using local tier"
        );
    }

    /// Encode for the remote tier; an unencodable value is only cached locally.
    fn encode_for_remote<T: Serialize>(&self, key: &str, value: &T) -> Option<String> {
        match codec::encode(value) {
            Ok(document) => Some(document),
            Err(e) => {
                self.record_remote_failure("put", key, &e);
                None
            }
        }
    }

    fn local_get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let value = self.local_get_quiet::<T>(key);
        if value.is_some() {
            self.counters.fallback_hit();
            crate::metrics::record_fallback_hit(&self.name);
            debug!(cache = %self.name, key, "Local tier hit");
        }
        value
    }

    fn local_get_quiet<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let local = self.local.as_ref()?;
        let _timer = LatencyTimer::new("local", "get");
        local.get(key)?.downcast_ref::<T>().cloned()
    }

    fn local_put<T: Send + Sync + 'static>(
        &self,
        key: &str,
        value: T,
        encoded_len: Option<usize>,
    ) -> Result<(), CacheError> {
        let Some(local) = &self.local else {
            return Ok(());
        };
        let weight = encoded_len.unwrap_or(std::mem::size_of::<T>());
        local.put_weighted(key, Arc::new(value), weight)?;
        Ok(())
    }
}

impl std::fmt::Debug for TieredFallbackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredFallbackCache")
            .field("name", &self.name)
            .field("local", &self.local.is_some())
            .field("remote_timeout", &self.remote_timeout)
            .field("single_flight", &self.key_locks.is_some())
            .finish_non_exhaustive()
    }
}
