// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote tier interface and its adapters.
//!
//! - [`traits`]: the narrow [`RemoteStore`](traits::RemoteStore) contract and [`RemoteError`](traits::RemoteError)
//! - [`redis`]: Redis-backed adapter (production)
//! - [`memory`]: process-local stand-in (no remote configured, tests)

pub mod traits;
pub mod redis;
pub mod memory;
