// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic stats snapshots of every registered cache.
//!
//! Collection is read-only: taking a snapshot never touches cache contents
//! or counters. Delivery is delegated to a [`StatsSink`]; two are provided,
//! one emitting `tracing` events and one setting `metrics` gauges.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::fallback::TieredStats;
use crate::registry::TieredCacheRegistry;

/// Counters of one cache at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub cache_name: String,
    /// Local-tier hits
    pub hit_count: u64,
    /// Local-tier misses
    pub miss_count: u64,
    /// `hit_count / (hit_count + miss_count)`, 0 when both are zero
    pub hit_rate: f64,
    pub eviction_count: u64,
    /// Local entries, including expired ones not yet purged
    pub estimated_size: usize,
    pub weighted_bytes: usize,
    pub remote_failures: u64,
    pub remote_timeouts: u64,
}

impl From<&TieredStats> for CacheStatsSnapshot {
    fn from(stats: &TieredStats) -> Self {
        let local = stats.local.unwrap_or_default();
        Self {
            cache_name: stats.name.clone(),
            hit_count: local.hits,
            miss_count: local.misses,
            hit_rate: local.hit_rate(),
            eviction_count: local.evictions,
            estimated_size: local.entry_count,
            weighted_bytes: local.weighted_bytes,
            remote_failures: stats.remote_failures(),
            remote_timeouts: stats.remote_timeouts,
        }
    }
}

/// Receiver of periodic snapshots.
pub trait StatsSink: Send + Sync {
    fn publish(&self, snapshots: &[CacheStatsSnapshot]);
}

/// One structured `info` event per cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatsSink for TracingSink {
    fn publish(&self, snapshots: &[CacheStatsSnapshot]) {
        for s in snapshots {
            info!(
                cache = %s.cache_name,
                hits = s.hit_count,
                misses = s.miss_count,
                hit_rate = s.hit_rate,
                evictions = s.eviction_count,
                size = s.estimated_size,
                bytes = s.weighted_bytes,
                remote_failures = s.remote_failures,
                "Cache stats"
            );
        }
    }
}

/// Per-cache gauges through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl StatsSink for MetricsSink {
    fn publish(&self, snapshots: &[CacheStatsSnapshot]) {
        for s in snapshots {
            crate::metrics::set_hit_ratio(&s.cache_name, s.hit_rate);
            crate::metrics::set_cache_size(&s.cache_name, s.estimated_size);
            crate::metrics::set_cache_evictions(&s.cache_name, s.eviction_count);
            crate::metrics::set_cache_bytes(&s.cache_name, s.weighted_bytes);
        }
    }
}

/// Snapshot collector over a registry.
pub struct CacheObservability {
    registry: Arc<TieredCacheRegistry>,
    interval: Duration,
    sinks: Vec<Box<dyn StatsSink>>,
}

impl CacheObservability {
    /// Collector publishing to [`TracingSink`] and [`MetricsSink`].
    pub fn new(registry: Arc<TieredCacheRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            sinks: vec![Box::new(TracingSink), Box::new(MetricsSink)],
        }
    }

    /// Collector with caller-provided sinks only.
    pub fn with_sinks(
        registry: Arc<TieredCacheRegistry>,
        interval: Duration,
        sinks: Vec<Box<dyn StatsSink>>,
    ) -> Self {
        Self { registry, interval, sinks }
    }

    /// Current counters of every cache, in table order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CacheStatsSnapshot> {
        self.registry
            .caches()
            .map(|cache| CacheStatsSnapshot::from(&cache.stats()))
            .collect()
    }

    /// Take one snapshot and hand it to every sink.
    pub fn publish(&self) -> Vec<CacheStatsSnapshot> {
        let snapshots = self.snapshot();
        for sink in &self.sinks {
            sink.publish(&snapshots);
        }
        snapshots
    }

    /// Publish every interval until `shutdown` flips to `true` or its
    /// sender is dropped. The first snapshot is taken one interval in.
    #[tracing::instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Stats collection stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.publish();
                }
            }
        }
    }
}
