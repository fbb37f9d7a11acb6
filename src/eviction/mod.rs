// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Victim selection for local-tier reclamation.
//!
//! Capacity overflow in the local engine is plain least-recently-used. When
//! the shared memory budget is under pressure, best-effort caches give up
//! entries ranked by [`ReclaimScorer`](scoring::ReclaimScorer): a blend of
//! recency, access frequency and entry size.

pub mod scoring;

pub use scoring::{ReclaimCandidate, ReclaimScorer};
