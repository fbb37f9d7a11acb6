// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memory pressure of the local tier.
//!
//! All local engines of a process charge their entries against one shared
//! [`MemoryBudget`]. The resulting pressure ratio drives reclamation of
//! best-effort caches (see [`ReclamationClass`](crate::policy::ReclamationClass)).
//!
//! # Example
//!
//! ```
//! use tiered_cache::backpressure::{MemoryBudget, PressureLevel};
//!
//! let budget = MemoryBudget::new(1000);
//! budget.charge(500);
//! assert_eq!(budget.level(), PressureLevel::Normal);
//!
//! budget.charge(300);
//! assert_eq!(budget.level(), PressureLevel::Elevated);
//!
//! budget.charge(150);
//! assert_eq!(budget.level(), PressureLevel::Critical);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

/// Pressure level derived from the budget usage ratio.
///
/// - **Normal** (< 70%): nothing is reclaimed
/// - **Elevated** (70-90%): `AccessWeak` entries are reclaimed
/// - **Critical** (>= 90%): `MemorySoft` entries are reclaimed as well
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Normal = 0,
    Elevated = 1,
    Critical = 2,
}

impl PressureLevel {
    #[must_use]
    pub fn from_pressure(pressure: f64) -> Self {
        match pressure {
            p if p < 0.70 => Self::Normal,
            p if p < 0.90 => Self::Elevated,
            _ => Self::Critical,
        }
    }

    /// Smallest pressure ratio mapping to this level.
    #[must_use]
    pub fn lower_bound(self) -> f64 {
        match self {
            Self::Normal => 0.0,
            Self::Elevated => 0.70,
            Self::Critical => 0.90,
        }
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Process-wide byte budget shared by every local engine.
#[derive(Debug)]
pub struct MemoryBudget {
    max_bytes: usize,
    used: AtomicUsize,
}

impl MemoryBudget {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn charge(&self, bytes: usize) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn release(&self, bytes: usize) {
        // Saturating: a release can never drive usage below zero
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    /// Usage ratio (0.0 - 1.0+).
    #[must_use]
    pub fn pressure(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.used_bytes() as f64 / self.max_bytes as f64
        }
    }

    #[must_use]
    pub fn level(&self) -> PressureLevel {
        PressureLevel::from_pressure(self.pressure())
    }
}
