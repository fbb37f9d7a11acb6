// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic tiered-cache usage example.
//!
//! Demonstrates:
//! 1. Building the registry (Redis when `CACHE_REDIS_HOST` is set, in-memory otherwise)
//! 2. Resolving named caches
//! 3. Write-through, reads and read-through loads
//! 4. Eviction
//! 5. Stats snapshots and background maintenance
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! # In-memory remote tier
//! cargo run --example basic_usage
//!
//! # Against a local Redis
//! docker run -d -p 6379:6379 redis:7-alpine
//! CACHE_REDIS_HOST=localhost cargo run --example basic_usage
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tiered_cache::{CacheError, CacheObservability, RemoteConfig, TieredCacheConfig, TieredCacheRegistry};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
}

async fn fetch_product(id: u64) -> Result<Product, CacheError> {
    // Stand-in for a database query
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok(Product { id, name: format!("Product {id}"), price_cents: 999 + id })
}

fn config_from_env() -> TieredCacheConfig {
    let remote = match std::env::var("CACHE_REDIS_HOST") {
        Ok(host) => RemoteConfig { host, ..RemoteConfig::default() },
        Err(_) => RemoteConfig { enabled: false, ..RemoteConfig::default() },
    };
    TieredCacheConfig {
        remote,
        local_memory_budget_bytes: 16 * 1024 * 1024,
        maintenance_interval_secs: 5,
        ..TieredCacheConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           tiered-cache: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Build the registry
    // ─────────────────────────────────────────────────────────────────────────
    let config = config_from_env();
    let registry = Arc::new(TieredCacheRegistry::connect(&config).await?);
    registry.validate_names(&["static", "frequent", "realtime", "large"])?;
    println!("📦 Caches: {:?}", registry.names());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = {
        let registry = registry.clone();
        let rx = shutdown_rx.clone();
        let interval = config.maintenance_interval();
        tokio::spawn(async move {
            if let Some(interval) = interval {
                registry.run_maintenance(interval, rx).await;
            }
        })
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Read-through loads
    // ─────────────────────────────────────────────────────────────────────────
    let products = registry.resolve("frequent")?;

    println!("\n🔎 Loading products...");
    for id in 1..=5 {
        let product: Product = products
            .get_or_load(&format!("product:{id}"), || fetch_product(id))
            .await?;
        println!("   ✓ {} ({} cents)", product.name, product.price_cents);
    }

    // Second pass is served from cache
    for id in 1..=5 {
        let _: Product = products
            .get_or_load(&format!("product:{id}"), || fetch_product(id))
            .await?;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Write-through and reads
    // ─────────────────────────────────────────────────────────────────────────
    let realtime = registry.resolve("realtime")?;
    realtime.put("price:1", 1049u64).await?;
    let price: Option<u64> = realtime.get("price:1").await;
    println!("\n💲 realtime price:1 = {price:?}");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Eviction
    // ─────────────────────────────────────────────────────────────────────────
    products.evict("product:3").await;
    let evicted: Option<Product> = products.get("product:3").await;
    println!("🗑  product:3 after evict = {evicted:?}");

    // Unknown names are configuration errors
    if let Err(e) = registry.resolve("no-such-cache") {
        println!("⚠  {e}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Stats
    // ─────────────────────────────────────────────────────────────────────────
    let observability = CacheObservability::new(registry.clone(), config.stats_interval());
    println!("\n📊 Stats:");
    for s in observability.publish() {
        println!(
            "   {:<10} hits={:<3} misses={:<3} hit_rate={:.2} size={:<3} remote_failures={}",
            s.cache_name, s.hit_count, s.miss_count, s.hit_rate, s.estimated_size, s.remote_failures
        );
    }
    println!("   memory pressure: {:.4}", registry.memory_pressure());

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    shutdown_tx.send(true)?;
    maintenance.await?;
    println!("\n✅ Done\n");
    Ok(())
}
