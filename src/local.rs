// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process cache engine (the local tier).
//!
//! A bounded key → value store with:
//! - **Write TTL**: entry expires a fixed time after it was written
//! - **Access TTL**: entry expires after a period without reads or writes
//! - **Capacity**: least-recently-used entries are evicted above `max_entries`
//! - **Reclamation**: best-effort caches give up entries when the shared
//!   [`MemoryBudget`] is under pressure
//!
//! When several triggers apply at once they are honored in that order: an
//! insert that overflows capacity first drops expired entries, and only then
//! falls back to LRU.
//!
//! # Layout
//!
//! ```text
//! ┌───────────────────────── Mutex<Store> ──────────────────────────┐
//! │  map:       key → Slot { value, weight, written_at, accessed_at } │
//! │  by_access: access tick → key   (LRU order, access-TTL order)   │
//! │  by_write:  write tick  → key   (write-TTL order)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because each TTL is constant per engine, the oldest entry of each index is
//! always the next to expire; purging only ever inspects the index fronts.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backpressure::MemoryBudget;
use crate::clock::{Clock, SystemClock};
use crate::error::LocalStoreError;
use crate::eviction::{ReclaimCandidate, ReclaimScorer};
use crate::policy::{NamedCachePolicy, ReclamationClass};

/// Local-tier slice of a [`NamedCachePolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPolicy {
    pub ttl_after_write: Option<Duration>,
    pub ttl_after_access: Option<Duration>,
    pub max_entries: usize,
    pub initial_capacity: usize,
    pub reclamation: ReclamationClass,
}

impl From<&NamedCachePolicy> for LocalPolicy {
    fn from(p: &NamedCachePolicy) -> Self {
        Self {
            ttl_after_write: p.ttl_after_write,
            ttl_after_access: p.ttl_after_access,
            max_entries: p.max_entries,
            initial_capacity: p.initial_capacity,
            reclamation: p.reclamation,
        }
    }
}

/// Cumulative counters of one engine. Counters never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LocalStats {
    pub hits: u64,
    pub misses: u64,
    /// Every removal not requested by a caller: expiry, capacity, reclamation
    pub evictions: u64,
    pub expirations: u64,
    pub reclaimed: u64,
    pub entry_count: usize,
    pub weighted_bytes: usize,
}

impl LocalStats {
    /// `hits / (hits + misses)`, or 0 when there were no lookups.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalCause {
    Expired,
    Capacity,
    Reclaimed,
}

impl RemovalCause {
    fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Capacity => "capacity",
            Self::Reclaimed => "reclaimed",
        }
    }
}

struct Slot<V> {
    value: V,
    weight: usize,
    written_at: Instant,
    accessed_at: Instant,
    access_tick: u64,
    write_tick: u64,
    access_count: u64,
}

struct Store<V> {
    map: HashMap<String, Slot<V>>,
    by_access: BTreeMap<u64, String>,
    by_write: BTreeMap<u64, String>,
    tick: u64,
    weighted_bytes: usize,
}

impl<V> Store<V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            by_access: BTreeMap::new(),
            by_write: BTreeMap::new(),
            tick: 0,
            weighted_bytes: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn insert(&mut self, key: &str, value: V, weight: usize, now: Instant) -> Option<Slot<V>> {
        let replaced = self.remove(key);
        let access_tick = self.next_tick();
        let write_tick = self.next_tick();
        self.by_access.insert(access_tick, key.to_string());
        self.by_write.insert(write_tick, key.to_string());
        self.weighted_bytes += weight;
        self.map.insert(
            key.to_string(),
            Slot {
                value,
                weight,
                written_at: now,
                accessed_at: now,
                access_tick,
                write_tick,
                access_count: 0,
            },
        );
        replaced
    }

    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.map.remove(key)?;
        self.by_access.remove(&slot.access_tick);
        self.by_write.remove(&slot.write_tick);
        self.weighted_bytes = self.weighted_bytes.saturating_sub(slot.weight);
        Some(slot)
    }

    fn touch(&mut self, key: &str, now: Instant) -> Option<&Slot<V>> {
        let tick = self.next_tick();
        let slot = self.map.get_mut(key)?;
        self.by_access.remove(&slot.access_tick);
        self.by_access.insert(tick, key.to_string());
        slot.access_tick = tick;
        slot.accessed_at = now;
        slot.access_count = slot.access_count.saturating_add(1);
        Some(slot)
    }

    fn lru_key(&self) -> Option<String> {
        self.by_access.values().next().cloned()
    }

    fn oldest_written_key(&self) -> Option<String> {
        self.by_write.values().next().cloned()
    }

    fn clear(&mut self) -> usize {
        let bytes = self.weighted_bytes;
        self.map.clear();
        self.by_access.clear();
        self.by_write.clear();
        self.weighted_bytes = 0;
        bytes
    }
}

/// Bounded in-process cache with TTL, LRU capacity and pressure reclamation.
///
/// Safe to share between tasks; all bookkeeping happens behind one internal
/// lock that is never held across an `.await`.
pub struct LocalCacheEngine<V> {
    name: String,
    policy: LocalPolicy,
    store: Mutex<Store<V>>,
    clock: Arc<dyn Clock>,
    budget: Arc<MemoryBudget>,
    scorer: ReclaimScorer,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    reclaimed: AtomicU64,
}

impl<V: Clone> LocalCacheEngine<V> {
    pub fn new(
        name: impl Into<String>,
        policy: LocalPolicy,
        clock: Arc<dyn Clock>,
        budget: Arc<MemoryBudget>,
    ) -> Self {
        let capacity = policy.initial_capacity.min(policy.max_entries);
        Self {
            name: name.into(),
            store: Mutex::new(Store::with_capacity(capacity)),
            policy,
            clock,
            budget,
            scorer: ReclaimScorer::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Engine with the system clock and its own unbounded budget.
    pub fn standalone(policy: &NamedCachePolicy) -> Self {
        Self::new(
            policy.name.clone(),
            LocalPolicy::from(policy),
            Arc::new(SystemClock),
            Arc::new(MemoryBudget::new(0)),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy(&self) -> &LocalPolicy {
        &self.policy
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a live entry, refreshing its recency.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut store = self.store.lock();

        let expired = match store.map.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(slot) => self.is_expired(slot, now),
        };

        if expired {
            if let Some(slot) = store.remove(key) {
                self.discard(slot, RemovalCause::Expired, 1);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let value = store.touch(key, now).map(|slot| slot.value.clone());
        self.hits.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Insert with a weight of `size_of::<V>()`.
    pub fn put(&self, key: &str, value: V) -> Result<(), LocalStoreError> {
        self.put_weighted(key, value, std::mem::size_of::<V>())
    }

    /// Insert or overwrite `key`, charging `weight` bytes to the memory budget.
    pub fn put_weighted(&self, key: &str, value: V, weight: usize) -> Result<(), LocalStoreError> {
        let budget = self.budget.max_bytes();
        if budget > 0 && weight > budget {
            return Err(LocalStoreError::Oversized { bytes: weight, budget });
        }

        let now = self.clock.now();
        {
            let mut store = self.store.lock();
            if let Some(old) = store.insert(key, value, weight, now) {
                self.budget.release(old.weight);
            }
            self.budget.charge(weight);

            if store.map.len() > self.policy.max_entries {
                self.purge_expired_locked(&mut store, now);
            }
            let mut overflow = 0;
            while store.map.len() > self.policy.max_entries {
                let Some(victim) = store.lru_key() else { break };
                if let Some(slot) = store.remove(&victim) {
                    self.discard(slot, RemovalCause::Capacity, 0);
                    overflow += 1;
                }
            }
            if overflow > 0 {
                crate::metrics::record_local_eviction(&self.name, RemovalCause::Capacity.as_str(), overflow);
            }
        }

        if self.policy.reclamation != ReclamationClass::Normal {
            self.reclaim();
        }
        Ok(())
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn evict(&self, key: &str) -> bool {
        match self.store.lock().remove(key) {
            Some(slot) => {
                self.budget.release(slot.weight);
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let bytes = self.store.lock().clear();
        self.budget.release(bytes);
    }

    /// Cache-aside read: return the live value or load, store and return it.
    ///
    /// Concurrent misses on the same key each run their own loader.
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<LocalStoreError>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = loader().await?;
        self.put(key, value.clone())?;
        Ok(value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut store = self.store.lock();
        self.purge_expired_locked(&mut store, now)
    }

    /// Give up entries while the shared budget is above this cache's
    /// release threshold. No-op for [`ReclamationClass::Normal`].
    pub fn reclaim(&self) -> usize {
        let class = self.policy.reclamation;
        let Some(threshold) = class.release_threshold() else {
            return 0;
        };
        if !class.reclaimable_at(self.budget.level()) {
            return 0;
        }

        let now = self.clock.now();
        let mut store = self.store.lock();
        let candidates: Vec<ReclaimCandidate> = store
            .map
            .iter()
            .map(|(key, slot)| ReclaimCandidate {
                key: key.clone(),
                weight_bytes: slot.weight,
                idle: now.saturating_duration_since(slot.accessed_at),
                access_count: slot.access_count,
            })
            .collect();

        let mut reclaimed = 0;
        for candidate in self.scorer.rank(candidates) {
            if self.budget.pressure() < threshold {
                break;
            }
            if let Some(slot) = store.remove(&candidate.key) {
                self.discard(slot, RemovalCause::Reclaimed, 0);
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            debug!(
                cache = %self.name,
                class = %class,
                reclaimed,
                pressure = self.budget.pressure(),
                "Reclaimed local entries under memory pressure"
            );
            crate::metrics::record_local_eviction(&self.name, RemovalCause::Reclaimed.as_str(), reclaimed);
        }
        reclaimed
    }

    #[must_use]
    pub fn stats(&self) -> LocalStats {
        let (entry_count, weighted_bytes) = {
            let store = self.store.lock();
            (store.map.len(), store.weighted_bytes)
        };
        LocalStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            entry_count,
            weighted_bytes,
        }
    }

    fn is_expired(&self, slot: &Slot<V>, now: Instant) -> bool {
        self.expired_by_write(slot, now) || self.expired_by_access(slot, now)
    }

    fn expired_by_write(&self, slot: &Slot<V>, now: Instant) -> bool {
        self.policy
            .ttl_after_write
            .is_some_and(|ttl| now.saturating_duration_since(slot.written_at) >= ttl)
    }

    fn expired_by_access(&self, slot: &Slot<V>, now: Instant) -> bool {
        self.policy
            .ttl_after_access
            .is_some_and(|ttl| now.saturating_duration_since(slot.accessed_at) >= ttl)
    }

    fn purge_expired_locked(&self, store: &mut Store<V>, now: Instant) -> usize {
        let mut purged = 0;

        if self.policy.ttl_after_write.is_some() {
            while let Some(key) = store.oldest_written_key() {
                let expired = store.map.get(&key).is_some_and(|s| self.expired_by_write(s, now));
                if !expired {
                    break;
                }
                if let Some(slot) = store.remove(&key) {
                    self.discard(slot, RemovalCause::Expired, 0);
                    purged += 1;
                }
            }
        }

        if self.policy.ttl_after_access.is_some() {
            while let Some(key) = store.lru_key() {
                let expired = store.map.get(&key).is_some_and(|s| self.expired_by_access(s, now));
                if !expired {
                    break;
                }
                if let Some(slot) = store.remove(&key) {
                    self.discard(slot, RemovalCause::Expired, 0);
                    purged += 1;
                }
            }
        }

        if purged > 0 {
            crate::metrics::record_local_eviction(&self.name, RemovalCause::Expired.as_str(), purged);
        }
        purged
    }

    /// Account for a slot removed by the engine itself. `report` is the
    /// number to publish to metrics immediately (0 when the caller batches).
    fn discard(&self, slot: Slot<V>, cause: RemovalCause, report: usize) {
        self.budget.release(slot.weight);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        match cause {
            RemovalCause::Expired => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
            RemovalCause::Reclaimed => {
                self.reclaimed.fetch_add(1, Ordering::Relaxed);
            }
            RemovalCause::Capacity => {}
        }
        if report > 0 {
            crate::metrics::record_local_eviction(&self.name, cause.as_str(), report);
        }
    }
}
