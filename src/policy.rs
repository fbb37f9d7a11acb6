// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named cache policies.
//!
//! A policy configures one logical cache in both tiers: expiry and capacity of
//! the local engine, and the TTL applied to documents on the remote tier.
//!
//! | name       | write TTL | access TTL | max   | initial | reclamation  |
//! |------------|-----------|------------|-------|---------|--------------|
//! | `static`   | 24h       | -          | 1000  | 100     | `Normal`     |
//! | `frequent` | 30m       | 15m        | 5000  | 500     | `Normal`     |
//! | `realtime` | 30s       | -          | 1000  | 100     | `AccessWeak` |
//! | `large`    | 10m       | -          | 2000  | 200     | `MemorySoft` |

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backpressure::PressureLevel;
use crate::error::CacheError;

/// Whether local entries may be dropped under memory pressure before their
/// TTL or capacity limit is reached.
///
/// Caches using `AccessWeak` or `MemorySoft` are best-effort: a value present
/// now may be gone on the next call even within TTL. They are never returned
/// past TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclamationClass {
    /// Removed only by TTL or capacity.
    Normal,
    /// Reclaimed opportunistically once memory pressure is elevated.
    AccessWeak,
    /// Reclaimed only as a last resort at critical pressure.
    MemorySoft,
}

impl ReclamationClass {
    /// Whether entries of this class may be reclaimed at `level`.
    #[must_use]
    pub fn reclaimable_at(self, level: PressureLevel) -> bool {
        match self {
            Self::Normal => false,
            Self::AccessWeak => level >= PressureLevel::Elevated,
            Self::MemorySoft => level >= PressureLevel::Critical,
        }
    }

    /// Pressure ratio below which reclamation of this class stops.
    #[must_use]
    pub fn release_threshold(self) -> Option<f64> {
        match self {
            Self::Normal => None,
            Self::AccessWeak => Some(PressureLevel::Elevated.lower_bound()),
            Self::MemorySoft => Some(PressureLevel::Critical.lower_bound()),
        }
    }

    /// Order in which caches are swept when the budget is under pressure.
    #[must_use]
    pub fn sweep_priority(self) -> Option<u8> {
        match self {
            Self::AccessWeak => Some(0),
            Self::MemorySoft => Some(1),
            Self::Normal => None,
        }
    }
}

impl std::fmt::Display for ReclamationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::AccessWeak => write!(f, "access_weak"),
            Self::MemorySoft => write!(f, "memory_soft"),
        }
    }
}

/// Configuration of one logical cache.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedCachePolicy {
    pub name: String,
    pub ttl_after_write: Option<Duration>,
    pub ttl_after_access: Option<Duration>,
    pub max_entries: usize,
    pub initial_capacity: usize,
    pub reclamation: ReclamationClass,
    /// TTL of documents on the remote tier; `None` falls back to `ttl_after_write`.
    pub remote_ttl: Option<Duration>,
}

impl NamedCachePolicy {
    #[must_use]
    pub fn new(name: impl Into<String>, max_entries: usize) -> Self {
        Self {
            name: name.into(),
            ttl_after_write: None,
            ttl_after_access: None,
            max_entries,
            initial_capacity: 0,
            reclamation: ReclamationClass::Normal,
            remote_ttl: None,
        }
    }

    #[must_use]
    pub fn expire_after_write(mut self, ttl: Duration) -> Self {
        self.ttl_after_write = Some(ttl);
        self
    }

    #[must_use]
    pub fn expire_after_access(mut self, ttl: Duration) -> Self {
        self.ttl_after_access = Some(ttl);
        self
    }

    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    #[must_use]
    pub fn reclamation(mut self, class: ReclamationClass) -> Self {
        self.reclamation = class;
        self
    }

    #[must_use]
    pub fn remote_ttl(mut self, ttl: Duration) -> Self {
        self.remote_ttl = Some(ttl);
        self
    }

    /// TTL applied to remote documents.
    #[must_use]
    pub fn effective_remote_ttl(&self) -> Option<Duration> {
        self.remote_ttl.or(self.ttl_after_write)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        let invalid = |reason: &str| CacheError::InvalidPolicy {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.name.contains("::") {
            return Err(invalid("name must not contain '::'"));
        }
        if self.max_entries == 0 {
            return Err(invalid("max_entries must be greater than zero"));
        }
        if self.initial_capacity > self.max_entries {
            return Err(invalid("initial_capacity exceeds max_entries"));
        }
        if self.ttl_after_write == Some(Duration::ZERO)
            || self.ttl_after_access == Some(Duration::ZERO)
        {
            return Err(invalid("TTL must be positive"));
        }
        Ok(())
    }

    /// The four policies of the reference deployment.
    #[must_use]
    pub fn reference_table() -> Vec<NamedCachePolicy> {
        vec![
            NamedCachePolicy::new("static", 1000)
                .initial_capacity(100)
                .expire_after_write(Duration::from_secs(24 * 60 * 60)),
            NamedCachePolicy::new("frequent", 5000)
                .initial_capacity(500)
                .expire_after_write(Duration::from_secs(30 * 60))
                .expire_after_access(Duration::from_secs(15 * 60)),
            NamedCachePolicy::new("realtime", 1000)
                .initial_capacity(100)
                .expire_after_write(Duration::from_secs(30))
                .reclamation(ReclamationClass::AccessWeak),
            NamedCachePolicy::new("large", 2000)
                .initial_capacity(200)
                .expire_after_write(Duration::from_secs(10 * 60))
                .reclamation(ReclamationClass::MemorySoft),
        ]
    }
}

/// Serde-facing form of [`NamedCachePolicy`] with second-based durations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub name: String,
    #[serde(default)]
    pub ttl_after_write_secs: Option<u64>,
    #[serde(default)]
    pub ttl_after_access_secs: Option<u64>,
    pub max_entries: usize,
    #[serde(default)]
    pub initial_capacity: usize,
    #[serde(default = "default_reclamation")]
    pub reclamation: ReclamationClass,
    #[serde(default)]
    pub remote_ttl_secs: Option<u64>,
}

fn default_reclamation() -> ReclamationClass {
    ReclamationClass::Normal
}

impl From<PolicyConfig> for NamedCachePolicy {
    fn from(c: PolicyConfig) -> Self {
        Self {
            name: c.name,
            ttl_after_write: c.ttl_after_write_secs.map(Duration::from_secs),
            ttl_after_access: c.ttl_after_access_secs.map(Duration::from_secs),
            max_entries: c.max_entries,
            initial_capacity: c.initial_capacity,
            reclamation: c.reclamation,
            remote_ttl: c.remote_ttl_secs.map(Duration::from_secs),
        }
    }
}

/// Whole seconds, rounded up so a sub-second TTL never becomes zero.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl From<&NamedCachePolicy> for PolicyConfig {
    fn from(p: &NamedCachePolicy) -> Self {
        Self {
            name: p.name.clone(),
            ttl_after_write_secs: p.ttl_after_write.map(ceil_secs),
            ttl_after_access_secs: p.ttl_after_access.map(ceil_secs),
            max_entries: p.max_entries,
            initial_capacity: p.initial_capacity,
            reclamation: p.reclamation,
            remote_ttl_secs: p.remote_ttl.map(ceil_secs),
        }
    }
}
