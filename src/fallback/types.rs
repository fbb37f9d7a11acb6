// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Counters and stats types for the tiered cache.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::local::LocalStats;
use crate::storage::traits::RemoteError;

/// Cumulative per-cache counters of the fallback protocol.
#[derive(Debug, Default)]
pub(crate) struct TierCounters {
    remote_hits: AtomicU64,
    remote_misses: AtomicU64,
    remote_timeouts: AtomicU64,
    remote_unavailable: AtomicU64,
    remote_codec_errors: AtomicU64,
    remote_write_failures: AtomicU64,
    fallback_hits: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    coalesced_loads: AtomicU64,
}

impl TierCounters {
    pub fn remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_miss(&self) {
        self.remote_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_failure(&self, err: &RemoteError) {
        let counter = match err {
            RemoteError::Timeout(_) => &self.remote_timeouts,
            RemoteError::Unavailable(_) => &self.remote_unavailable,
            RemoteError::Codec(_) => &self.remote_codec_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_write_failure(&self) {
        self.remote_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn coalesced_load(&self) {
        self.coalesced_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, name: &str, local: Option<LocalStats>) -> TieredStats {
        TieredStats {
            name: name.to_string(),
            local,
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            remote_misses: self.remote_misses.load(Ordering::Relaxed),
            remote_timeouts: self.remote_timeouts.load(Ordering::Relaxed),
            remote_unavailable: self.remote_unavailable.load(Ordering::Relaxed),
            remote_codec_errors: self.remote_codec_errors.load(Ordering::Relaxed),
            remote_write_failures: self.remote_write_failures.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            coalesced_loads: self.coalesced_loads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one tiered cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieredStats {
    pub name: String,
    /// `None` when the cache runs without a local tier
    pub local: Option<LocalStats>,
    pub remote_hits: u64,
    pub remote_misses: u64,
    pub remote_timeouts: u64,
    pub remote_unavailable: u64,
    /// Documents that could not be encoded or decoded
    pub remote_codec_errors: u64,
    /// Failed remote put/evict/clear calls (subset of the failure counters)
    pub remote_write_failures: u64,
    /// Reads answered by the local tier
    pub fallback_hits: u64,
    pub loads: u64,
    pub load_failures: u64,
    /// Loads avoided because a concurrent load of the same key finished first
    pub coalesced_loads: u64,
}

impl TieredStats {
    /// All remote failures regardless of cause.
    #[must_use]
    pub fn remote_failures(&self) -> u64 {
        self.remote_timeouts + self.remote_unavailable + self.remote_codec_errors
    }
}

/// Outcome of the remote leg of a read.
#[derive(Debug)]
pub(crate) enum RemoteRead<T> {
    Hit(T),
    Miss,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failures_are_bucketed_by_cause() {
        let counters = TierCounters::default();
        counters.remote_failure(&RemoteError::Timeout(Duration::from_millis(10)));
        counters.remote_failure(&RemoteError::Unavailable("refused".into()));
        counters.remote_failure(&RemoteError::Unavailable("reset".into()));
        counters.remote_failure(&RemoteError::Codec("bad".into()));

        let stats = counters.snapshot("frequent", None);
        assert_eq!(stats.remote_timeouts, 1);
        assert_eq!(stats.remote_unavailable, 2);
        assert_eq!(stats.remote_codec_errors, 1);
        assert_eq!(stats.remote_failures(), 4);
        assert_eq!(stats.name, "frequent");
    }
}
