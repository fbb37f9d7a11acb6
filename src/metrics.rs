// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the tiered cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tiered_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `cache`: logical cache name (`static`, `frequent`, ...)
//! - `tier`: `remote`, `local`
//! - `operation`: get, put, evict, clear, load
//! - `cause`: timeout, unavailable, codec (remote failures);
//!   expired, capacity, reclaimed (local evictions)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of one tier operation (`hit`, `miss`, `ok`, `error`)
pub fn record_operation(cache: &str, tier: &str, operation: &str, outcome: &str) {
    counter!(
        "tiered_cache_operations_total",
        "cache" => cache.to_string(),
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "tiered_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a remote call that was absorbed by the fallback path
pub fn record_remote_failure(cache: &str, operation: &str, cause: &str) {
    counter!(
        "tiered_cache_remote_failures_total",
        "cache" => cache.to_string(),
        "operation" => operation.to_string(),
        "cause" => cause.to_string()
    )
    .increment(1);
}

/// Record a read served by the local tier after the remote tier failed or missed
pub fn record_fallback_hit(cache: &str) {
    counter!(
        "tiered_cache_fallback_hits_total",
        "cache" => cache.to_string()
    )
    .increment(1);
}

/// Record a loader invocation (`success`, `failure`)
pub fn record_load(cache: &str, outcome: &str) {
    counter!(
        "tiered_cache_loads_total",
        "cache" => cache.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a load that was satisfied by another caller's in-flight load
pub fn record_coalesced_load(cache: &str) {
    counter!(
        "tiered_cache_coalesced_loads_total",
        "cache" => cache.to_string()
    )
    .increment(1);
}

/// Record local entries removed by the engine itself
pub fn record_local_eviction(cache: &str, cause: &str, count: usize) {
    counter!(
        "tiered_cache_local_evictions_total",
        "cache" => cache.to_string(),
        "cause" => cause.to_string()
    )
    .increment(count as u64);
}

/// Set shared local memory pressure (0.0 - 1.0+)
pub fn set_memory_pressure(pressure: f64) {
    gauge!("tiered_cache_memory_pressure").set(pressure);
}

/// Set pressure level (0 = Normal, 1 = Elevated, 2 = Critical)
pub fn set_pressure_level(level: u8) {
    gauge!("tiered_cache_pressure_level").set(level as f64);
}

/// Per-cache hit ratio from the periodic snapshot
pub fn set_hit_ratio(cache: &str, ratio: f64) {
    gauge!(
        "tiered_cache_hit_ratio",
        "cache" => cache.to_string()
    )
    .set(ratio);
}

/// Per-cache local entry count from the periodic snapshot
pub fn set_cache_size(cache: &str, entries: usize) {
    gauge!(
        "tiered_cache_size",
        "cache" => cache.to_string()
    )
    .set(entries as f64);
}

/// Per-cache cumulative eviction count from the periodic snapshot
pub fn set_cache_evictions(cache: &str, evictions: u64) {
    gauge!(
        "tiered_cache_evictions",
        "cache" => cache.to_string()
    )
    .set(evictions as f64);
}

/// Per-cache local bytes from the periodic snapshot
pub fn set_cache_bytes(cache: &str, bytes: usize) {
    gauge!(
        "tiered_cache_local_bytes",
        "cache" => cache.to_string()
    )
    .set(bytes as f64);
}

/// Record circuit breaker call
pub fn record_circuit_breaker_call(circuit: &str, outcome: &str) {
    counter!(
        "tiered_cache_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set remote tier health from the last probe
pub fn set_remote_healthy(healthy: bool) {
    gauge!("tiered_cache_remote_healthy").set(if healthy { 1.0 } else { 0.0 });
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(metrics_util::CompositeKey, Option<metrics::Unit>, Option<metrics::SharedString>, DebugValue)],
        name: &str,
    ) -> u64 {
        snapshot
            .iter()
            .filter(|(key, ..)| key.key().name() == name)
            .map(|(.., value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_counters_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_remote_failure("frequent", "get", "timeout");
            record_remote_failure("frequent", "put", "unavailable");
            record_fallback_hit("frequent");
            record_local_eviction("realtime", "reclaimed", 3);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(counter_value(&snapshot, "tiered_cache_remote_failures_total"), 2);
        assert_eq!(counter_value(&snapshot, "tiered_cache_fallback_hits_total"), 1);
        assert_eq!(counter_value(&snapshot, "tiered_cache_local_evictions_total"), 3);
    }

    #[test]
    fn test_gauges_are_set() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_hit_ratio("static", 0.75);
            set_cache_size("static", 12);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let ratio = snapshot
            .iter()
            .find(|(key, ..)| key.key().name() == "tiered_cache_hit_ratio")
            .map(|(.., value)| value.clone());
        assert_eq!(ratio, Some(&DebugValue::Gauge(0.75.into())));
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let _timer = LatencyTimer::new("local", "get");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert!(snapshot
            .iter()
            .any(|(key, ..)| key.key().name() == "tiered_cache_operation_seconds"));
    }

    #[test]
    fn test_without_recorder_is_noop() {
        record_operation("static", "remote", "get", "hit");
        record_load("static", "failure");
        set_memory_pressure(0.5);
        set_pressure_level(1);
        set_remote_healthy(false);
    }
}
