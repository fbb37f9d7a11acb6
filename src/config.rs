// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the tiered cache.
//!
//! # Example
//!
//! ```
//! use tiered_cache::TieredCacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = TieredCacheConfig::default();
//! assert_eq!(config.local_memory_budget_bytes, 256 * 1024 * 1024); // 256 MB
//! assert_eq!(config.policies.len(), 4);
//!
//! // From JSON, overriding only what differs
//! let config: TieredCacheConfig = serde_json::from_str(r#"{
//!     "remote": { "host": "cache.internal", "command_timeout_ms": 500 },
//!     "single_flight": true
//! }"#).unwrap();
//! assert_eq!(config.remote.port, 6379);
//! assert!(config.single_flight);
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::policy::{NamedCachePolicy, PolicyConfig};
use crate::resilience::circuit_breaker::CircuitConfig;

/// Configuration for the tiered cache.
///
/// Every field has a default. The policy table is fixed for the lifetime of
/// the process; changing it requires a restart.
#[derive(Debug, Clone, Deserialize)]
pub struct TieredCacheConfig {
    /// Remote tier connection
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Byte budget shared by every local engine (default: 256 MB)
    #[serde(default = "default_local_memory_budget_bytes")]
    pub local_memory_budget_bytes: usize,

    /// Purge + reclaim interval in seconds (0 = disabled)
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Stats snapshot interval in seconds
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Collapse concurrent loads of the same key into one loader call
    #[serde(default)]
    pub single_flight: bool,

    /// Circuit breaker on remote calls (disabled when absent)
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSettings>,

    /// Named cache policies
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyConfig>,
}

fn default_local_memory_budget_bytes() -> usize { 256 * 1024 * 1024 } // 256 MB
fn default_maintenance_interval_secs() -> u64 { 30 }
fn default_stats_interval_secs() -> u64 { 60 }
fn default_policies() -> Vec<PolicyConfig> {
    NamedCachePolicy::reference_table()
        .iter()
        .map(PolicyConfig::from)
        .collect()
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            local_memory_budget_bytes: default_local_memory_budget_bytes(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
            single_flight: false,
            circuit_breaker: None,
            policies: default_policies(),
        }
    }
}

impl TieredCacheConfig {
    /// Policy table as domain types.
    #[must_use]
    pub fn named_policies(&self) -> Vec<NamedCachePolicy> {
        self.policies.iter().cloned().map(NamedCachePolicy::from).collect()
    }

    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    /// `None` when periodic maintenance is disabled.
    #[must_use]
    pub fn maintenance_interval(&self) -> Option<Duration> {
        (self.maintenance_interval_secs > 0).then(|| Duration::from_secs(self.maintenance_interval_secs))
    }
}

/// Remote tier endpoint and client limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// When false the registry uses an in-process stand-in for the remote tier
    #[serde(default = "default_remote_enabled")]
    pub enabled: bool,

    #[serde(default = "default_remote_host")]
    pub host: String,

    #[serde(default = "default_remote_port")]
    pub port: u16,

    #[serde(default)]
    pub database: u8,

    #[serde(default)]
    pub password: Option<String>,

    /// Deadline of a single remote call; also bounds each fallback path
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Reconnect attempts of the client before a call fails
    #[serde(default = "default_max_reconnect_retries")]
    pub max_reconnect_retries: usize,
}

fn default_remote_enabled() -> bool { true }
fn default_remote_host() -> String { "localhost".to_string() }
fn default_remote_port() -> u16 { 6379 }
fn default_command_timeout_ms() -> u64 { 3000 }
fn default_max_reconnect_retries() -> usize { 3 }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_remote_enabled(),
            host: default_remote_host(),
            port: default_remote_port(),
            database: 0,
            password: None,
            command_timeout_ms: default_command_timeout_ms(),
            max_reconnect_retries: default_max_reconnect_retries(),
        }
    }
}

impl RemoteConfig {
    /// Connection URL, including credentials when configured.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Serde-facing circuit breaker settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CircuitBreakerSettings {
    /// Failure rate (0.0 - 1.0) that opens the circuit
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f32,

    /// Calls observed in the closed state before the rate is evaluated
    #[serde(default = "default_closed_buffer_size")]
    pub closed_buffer_size: usize,

    /// Probe calls allowed while half-open
    #[serde(default = "default_half_open_buffer_size")]
    pub half_open_buffer_size: usize,

    /// Time the circuit stays open before probing
    #[serde(default = "default_open_wait_secs")]
    pub open_wait_secs: u64,
}

fn default_failure_rate_threshold() -> f32 { 0.5 }
fn default_closed_buffer_size() -> usize { 20 }
fn default_half_open_buffer_size() -> usize { 5 }
fn default_open_wait_secs() -> u64 { 10 }

impl From<&CircuitBreakerSettings> for CircuitConfig {
    fn from(s: &CircuitBreakerSettings) -> Self {
        Self {
            failure_rate_threshold: s.failure_rate_threshold,
            closed_len: s.closed_buffer_size,
            half_open_len: s.half_open_buffer_size,
            open_wait: Duration::from_secs(s.open_wait_secs),
        }
    }
}
