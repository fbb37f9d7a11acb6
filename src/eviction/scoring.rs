// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

/// Entry metadata used to rank reclamation victims
#[derive(Debug, Clone)]
pub struct ReclaimCandidate {
    pub key: String,
    pub weight_bytes: usize,
    pub idle: Duration,
    pub access_count: u64,
}

/// Scoring policy combining recency, frequency, and size.
///
/// Score is in `0.0..=1.0`; lower scores are reclaimed first.
#[derive(Debug, Clone)]
pub struct ReclaimScorer {
    /// Half-life for recency decay (seconds)
    pub recency_half_life: f64,
    /// Max access count for normalization
    pub max_access_count: u64,
    /// Baseline size in bytes for size scoring
    pub baseline_size_bytes: usize,
    /// Weights for each component (recency, frequency, size)
    pub weights: (f64, f64, f64),
}

impl Default for ReclaimScorer {
    fn default() -> Self {
        Self {
            recency_half_life: 300.0, // 5 minutes
            max_access_count: 1000,
            baseline_size_bytes: 64 * 1024,
            weights: (0.4, 0.4, 0.2),
        }
    }
}

impl ReclaimScorer {
    #[must_use]
    pub fn score(&self, candidate: &ReclaimCandidate) -> f64 {
        let recency = (-candidate.idle.as_secs_f64() / self.recency_half_life).exp();

        let frequency = if candidate.access_count == 0 {
            0.0
        } else {
            let count = candidate.access_count.min(self.max_access_count) as f64;
            (1.0 + count).ln() / (1.0 + self.max_access_count as f64).ln()
        };

        let size_ratio = candidate.weight_bytes as f64 / self.baseline_size_bytes.max(1) as f64;
        let size_score = 1.0 / (1.0 + size_ratio);

        recency * self.weights.0 + frequency * self.weights.1 + size_score * self.weights.2
    }

    /// Rank candidates, cheapest to lose first. Ties keep input order.
    #[must_use]
    pub fn rank(&self, candidates: Vec<ReclaimCandidate>) -> Vec<ReclaimCandidate> {
        let mut scored: Vec<_> = candidates
            .into_iter()
            .map(|c| (self.score(&c), c))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, c)| c).collect()
    }
}
