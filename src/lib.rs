// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tiered Cache
//!
//! A resilience and tiering layer in front of a shared remote cache.
//!
//! ## Architecture
//!
//! Each named cache combines two independently failing stores:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TieredCacheRegistry                       │
//! │  • name → TieredFallbackCache, built once at startup        │
//! │  • unknown names are configuration errors                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Remote tier (authoritative)                 │
//! │  • Redis, shared by every process                           │
//! │  • every call bounded by the command timeout                │
//! │  • optional circuit breaker                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (miss, timeout or failure)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Local tier (fallback)                      │
//! │  • in-process, typed values, no serialization               │
//! │  • write/access TTL, LRU capacity                           │
//! │  • best-effort caches reclaimed under memory pressure       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote errors never reach the caller: they are logged, counted and turned
//! into a local lookup. Loader errors are returned verbatim.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use tiered_cache::{CacheError, TieredCacheConfig, TieredCacheRegistry};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Product { id: u64, name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let registry = TieredCacheRegistry::connect(&TieredCacheConfig::default()).await?;
//!     let products = registry.resolve("frequent")?;
//!
//!     let product: Product = products
//!         .get_or_load("product:42", || async {
//!             Ok::<_, CacheError>(Product { id: 42, name: "widget".into() })
//!         })
//!         .await?;
//!
//!     products.evict("product:42").await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`fallback`]: The [`TieredFallbackCache`] fallback protocol
//! - [`registry`]: Name → cache resolution and local-tier maintenance
//! - [`local`]: In-process cache engine
//! - [`storage`]: Remote tier adapters (Redis, in-memory)
//! - [`policy`]: Named cache policies and reclamation classes
//! - [`backpressure`]: Shared local memory budget
//! - [`observability`]: Periodic stats snapshots
//! - [`resilience`]: Circuit breaker and startup retry

pub mod backpressure;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod eviction;
pub mod fallback;
pub mod local;
pub mod metrics;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod resilience;
pub mod storage;

pub use backpressure::{MemoryBudget, PressureLevel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CircuitBreakerSettings, RemoteConfig, TieredCacheConfig};
pub use error::{CacheError, LocalStoreError};
pub use fallback::{FallbackOptions, LocalValue, TieredFallbackCache, TieredStats};
pub use local::{LocalCacheEngine, LocalPolicy, LocalStats};
pub use metrics::LatencyTimer;
pub use observability::{CacheObservability, CacheStatsSnapshot, MetricsSink, StatsSink, TracingSink};
pub use policy::{NamedCachePolicy, PolicyConfig, ReclamationClass};
pub use registry::TieredCacheRegistry;
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use resilience::retry::RetryConfig;
pub use storage::memory::InMemoryRemoteStore;
pub use storage::redis::RedisRemoteStore;
pub use storage::traits::{RemoteError, RemoteStore};
