// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience helpers for the remote tier: circuit breaker and startup retry.

pub mod circuit_breaker;
pub mod retry;
