// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide registry of named tiered caches.
//!
//! The registry is built once from a policy table and is read-only
//! afterwards: every cache is created up front, so resolution on the hot path
//! is a plain map lookup with no locking. Construct it at startup and pass it
//! (usually as `Arc<TieredCacheRegistry>`) to whatever needs a cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use tiered_cache::{TieredCacheConfig, TieredCacheRegistry};
//!
//! # async fn example() -> Result<(), tiered_cache::CacheError> {
//! let registry = TieredCacheRegistry::connect(&TieredCacheConfig::default()).await?;
//!
//! // Fail fast on names the application expects
//! registry.validate_names(&["static", "frequent"])?;
//!
//! let products = registry.resolve("frequent")?;
//! products.put("product:42", "widget".to_string()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backpressure::{MemoryBudget, PressureLevel};
use crate::clock::SystemClock;
use crate::config::TieredCacheConfig;
use crate::error::CacheError;
use crate::fallback::{FallbackOptions, TieredFallbackCache};
use crate::policy::NamedCachePolicy;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig};
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::memory::InMemoryRemoteStore;
use crate::storage::redis::RedisRemoteStore;
use crate::storage::traits::{RemoteError, RemoteStore};

/// Name → cache map built from a fixed policy table.
pub struct TieredCacheRegistry {
    caches: HashMap<String, Arc<TieredFallbackCache>>,
    /// Table order, for stable enumeration
    order: Vec<String>,
    remote: Arc<dyn RemoteStore>,
    budget: Arc<MemoryBudget>,
    remote_timeout: Duration,
}

impl TieredCacheRegistry {
    /// Build every cache of `policies` over `remote`.
    ///
    /// Fails on an invalid policy or a duplicated name.
    pub fn new(
        policies: Vec<NamedCachePolicy>,
        remote: Arc<dyn RemoteStore>,
        options: FallbackOptions,
    ) -> Result<Self, CacheError> {
        let mut caches = HashMap::with_capacity(policies.len());
        let mut order = Vec::with_capacity(policies.len());

        for policy in policies {
            policy.validate()?;
            if caches.contains_key(&policy.name) {
                return Err(CacheError::InvalidPolicy {
                    name: policy.name,
                    reason: "duplicate cache name".to_string(),
                });
            }

            debug!(
                cache = %policy.name,
                max_entries = policy.max_entries,
                reclamation = %policy.reclamation,
                "Registering tiered cache"
            );
            let name = policy.name.clone();
            let cache = TieredFallbackCache::new(policy, remote.clone(), options.clone());
            caches.insert(name.clone(), Arc::new(cache));
            order.push(name);
        }

        Ok(Self {
            caches,
            order,
            remote,
            budget: options.budget,
            remote_timeout: options.remote_timeout,
        })
    }

    /// Build the registry from configuration, probing the remote tier with
    /// [`RetryConfig::startup`].
    pub async fn connect(config: &TieredCacheConfig) -> Result<Self, CacheError> {
        Self::connect_with(config, &RetryConfig::startup()).await
    }

    /// [`connect`](Self::connect) with an explicit probe schedule.
    ///
    /// An unreachable remote is not an error: it is logged and the registry
    /// serves from the local tier until the remote answers again.
    pub async fn connect_with(config: &TieredCacheConfig, probe: &RetryConfig) -> Result<Self, CacheError> {
        let remote: Arc<dyn RemoteStore> = if config.remote.enabled {
            let store = RedisRemoteStore::new(&config.remote)?;
            info!(endpoint = %store.endpoint(), "Using Redis remote tier");
            Arc::new(store)
        } else {
            warn!("Remote tier disabled, using in-process stand-in (not shared across processes)");
            Arc::new(InMemoryRemoteStore::new())
        };

        let breaker = config.circuit_breaker.as_ref().map(|settings| {
            Arc::new(CircuitBreaker::new("remote", CircuitConfig::from(settings)))
        });

        let options = FallbackOptions {
            remote_timeout: config.remote.command_timeout(),
            local_enabled: true,
            single_flight: config.single_flight,
            breaker,
            clock: Arc::new(SystemClock),
            budget: Arc::new(MemoryBudget::new(config.local_memory_budget_bytes)),
        };

        let registry = Self::new(config.named_policies(), remote, options)?;

        match registry.probe_remote(probe).await {
            Ok(()) => info!(caches = registry.order.len(), "Tiered cache registry ready"),
            Err(e) => warn!(
                error = %e,
                cause = e.cause(),
                "Remote tier unreachable at startup, serving from local tier until it recovers"
            ),
        }
        Ok(registry)
    }

    /// Ping the remote tier under `schedule`, each attempt bounded by the
    /// remote timeout.
    pub async fn probe_remote(&self, schedule: &RetryConfig) -> Result<(), RemoteError> {
        let deadline = self.remote_timeout;
        let result = retry("remote_ping", schedule, || async {
            tokio::time::timeout(deadline, self.remote.ping())
                .await
                .unwrap_or(Err(RemoteError::Timeout(deadline)))
        })
        .await;
        crate::metrics::set_remote_healthy(result.is_ok());
        result
    }

    /// Look up a configured cache.
    ///
    /// An unknown name is a configuration error; no cache is created for it.
    pub fn resolve(&self, name: &str) -> Result<Arc<TieredFallbackCache>, CacheError> {
        self.caches
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownCacheName(name.to_string()))
    }

    /// Configured names in table order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Check that every name the application relies on is configured.
    pub fn validate_names(&self, required: &[&str]) -> Result<(), CacheError> {
        match required.iter().find(|name| !self.caches.contains_key(**name)) {
            Some(missing) => Err(CacheError::UnknownCacheName((*missing).to_string())),
            None => Ok(()),
        }
    }

    /// Caches in table order.
    pub fn caches(&self) -> impl Iterator<Item = &Arc<TieredFallbackCache>> + '_ {
        self.order.iter().filter_map(|name| self.caches.get(name))
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    #[must_use]
    pub fn memory_budget(&self) -> &Arc<MemoryBudget> {
        &self.budget
    }

    /// Shared local memory pressure (0.0 - 1.0+).
    #[must_use]
    pub fn memory_pressure(&self) -> f64 {
        self.budget.pressure()
    }

    /// Drop expired local entries of every cache.
    pub fn purge_expired(&self) -> usize {
        self.caches().map(|cache| cache.purge_expired()).sum()
    }

    /// Sweep best-effort caches while the budget is under pressure:
    /// `AccessWeak` caches first, then `MemorySoft` ones.
    pub fn reclaim(&self) -> usize {
        let mut sweep: Vec<_> = self
            .caches()
            .filter_map(|cache| cache.policy().reclamation.sweep_priority().map(|p| (p, cache)))
            .collect();
        sweep.sort_by_key(|(priority, _)| *priority);

        let mut reclaimed = 0;
        for (_, cache) in sweep {
            if self.budget.level() == PressureLevel::Normal {
                break;
            }
            reclaimed += cache.reclaim();
        }
        reclaimed
    }

    /// One maintenance pass: purge, reclaim, publish pressure gauges.
    ///
    /// Returns local `(purged, reclaimed)` counts. Expired documents of a
    /// remote that does not expire them itself are purged too.
    pub fn maintain(&self) -> (usize, usize) {
        let purged = self.purge_expired();
        let reclaimed = self.reclaim();
        let remote_purged = self.remote.purge_expired();

        let pressure = self.memory_pressure();
        crate::metrics::set_memory_pressure(pressure);
        crate::metrics::set_pressure_level(self.budget.level() as u8);

        if purged > 0 || reclaimed > 0 || remote_purged > 0 {
            debug!(purged, reclaimed, remote_purged, pressure, "Maintenance pass");
        }
        (purged, reclaimed)
    }

    /// Run [`maintain`](Self::maintain) every `interval` until `shutdown`
    /// flips to `true` or its sender is dropped.
    #[tracing::instrument(skip(self, shutdown))]
    pub async fn run_maintenance(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Maintenance loop stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.maintain();
                }
            }
        }
    }
}

impl std::fmt::Debug for TieredCacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCacheRegistry")
            .field("caches", &self.order)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::policy::ReclamationClass;

    fn registry() -> TieredCacheRegistry {
        TieredCacheRegistry::new(
            NamedCachePolicy::reference_table(),
            Arc::new(InMemoryRemoteStore::new()),
            FallbackOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_names_in_table_order() {
        assert_eq!(registry().names(), ["static", "frequent", "realtime", "large"]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = registry();
        let a = registry.resolve("frequent").unwrap();
        let b = registry.resolve("frequent").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.policy().max_entries, 5000);
    }

    #[test]
    fn test_unknown_name_is_fatal() {
        let err = registry().resolve("bogus").unwrap_err();
        assert_eq!(err, CacheError::UnknownCacheName("bogus".into()));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_names() {
        let registry = registry();
        registry.validate_names(&["static", "large"]).unwrap();
        assert_eq!(
            registry.validate_names(&["static", "sessions"]).unwrap_err(),
            CacheError::UnknownCacheName("sessions".into())
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = TieredCacheRegistry::new(
            vec![NamedCachePolicy::new("a", 10), NamedCachePolicy::new("a", 20)],
            Arc::new(InMemoryRemoteStore::new()),
            FallbackOptions::default(),
        );
        assert!(matches!(result, Err(CacheError::InvalidPolicy { ref reason, .. }) if reason.contains("duplicate")));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = TieredCacheRegistry::new(
            vec![NamedCachePolicy::new("zero", 0)],
            Arc::new(InMemoryRemoteStore::new()),
            FallbackOptions::default(),
        );
        assert!(matches!(result, Err(CacheError::InvalidPolicy { .. })));
    }

    #[tokio::test]
    async fn test_reclaim_sweeps_weak_before_soft() {
        let budget = Arc::new(MemoryBudget::new(1000));
        let registry = TieredCacheRegistry::new(
            vec![
                NamedCachePolicy::new("pinned", 100),
                NamedCachePolicy::new("soft", 100).reclamation(ReclamationClass::MemorySoft),
                NamedCachePolicy::new("weak", 100).reclamation(ReclamationClass::AccessWeak),
            ],
            Arc::new(InMemoryRemoteStore::new()),
            FallbackOptions {
                budget: budget.clone(),
                ..FallbackOptions::default()
            },
        )
        .unwrap();

        let fill = |name: &str, count: usize| {
            let local = registry.resolve(name).unwrap();
            let local = local.local().unwrap();
            for i in 0..count {
                local
                    .put_weighted(&format!("{name}{i}"), Arc::new(i), 100)
                    .unwrap();
            }
        };
        fill("weak", 1);
        fill("soft", 2);
        fill("pinned", 4);
        assert_eq!(budget.level(), PressureLevel::Elevated);

        // Weak cache gives up its entry; pressure drops below Elevated
        assert_eq!(registry.reclaim(), 1);
        assert_eq!(budget.level(), PressureLevel::Normal);
        assert_eq!(registry.resolve("soft").unwrap().stats().local.unwrap().reclaimed, 0);
        assert_eq!(registry.resolve("pinned").unwrap().local().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_connect_without_remote_uses_stand_in() {
        let config = TieredCacheConfig {
            remote: RemoteConfig {
                enabled: false,
                ..RemoteConfig::default()
            },
            ..TieredCacheConfig::default()
        };
        let registry = TieredCacheRegistry::connect(&config).await.unwrap();

        let cache = registry.resolve("static").unwrap();
        cache.put("k", 1u32).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await, Some(1));
        assert!(registry.probe_remote(&RetryConfig::once()).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_with_unreachable_remote_starts_degraded() {
        let config = TieredCacheConfig {
            remote: RemoteConfig {
                port: 1,
                command_timeout_ms: 200,
                max_reconnect_retries: 0,
                ..RemoteConfig::default()
            },
            ..TieredCacheConfig::default()
        };
        let registry = TieredCacheRegistry::connect_with(&config, &RetryConfig::once())
            .await
            .unwrap();

        let cache = registry.resolve("frequent").unwrap();
        cache.put("product:42", "widget".to_string()).await.unwrap();
        assert_eq!(cache.get::<String>("product:42").await.as_deref(), Some("widget"));
        assert!(cache.stats().remote_failures() >= 2);
    }

    #[tokio::test]
    async fn test_maintain_purges_both_tiers() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let remote = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
        let registry = TieredCacheRegistry::new(
            NamedCachePolicy::reference_table(),
            remote.clone(),
            FallbackOptions {
                clock: clock.clone(),
                ..FallbackOptions::default()
            },
        )
        .unwrap();

        let realtime = registry.resolve("realtime").unwrap();
        for i in 0..1000u32 {
            realtime.put(&format!("tick:{i}"), i).await.unwrap();
        }
        assert_eq!(remote.len(), 1000);

        clock.advance(Duration::from_secs(60 * 60));
        let (purged, _) = registry.maintain();

        assert_eq!(purged, 1000);
        assert_eq!(realtime.local().unwrap().len(), 0);
        assert_eq!(remote.len(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_loop_stops_on_shutdown() {
        let registry = Arc::new(registry());
        let (tx, rx) = watch::channel(false);

        let handle = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.run_maintenance(Duration::from_millis(5), rx).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
