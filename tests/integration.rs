// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration Tests against a real Redis
//!
//! Tests use testcontainers for portability - no external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//!
//! # Run only failure scenario tests
//! cargo test --test integration failure -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: write-through, namespaces, remote TTL
//! - `failure_*` - Failure scenarios: Redis down at startup, Redis death mid-operation

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiered_cache::{
    CacheError, RemoteConfig, RetryConfig, TieredCacheConfig, TieredCacheRegistry,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn config_for_port(port: u16) -> TieredCacheConfig {
    TieredCacheConfig {
        remote: RemoteConfig {
            host: "127.0.0.1".into(),
            port,
            command_timeout_ms: 500,
            max_reconnect_retries: 1,
            ..RemoteConfig::default()
        },
        ..TieredCacheConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
}

fn product(id: u64) -> Product {
    Product { id, name: format!("product {id}") }
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_write_through_to_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let registry = TieredCacheRegistry::connect(&config_for_port(port))
        .await
        .expect("registry should build");
    registry
        .probe_remote(&RetryConfig::startup())
        .await
        .expect("Redis should answer PING");

    let frequent = registry.resolve("frequent").unwrap();
    frequent.put("product:42", product(42)).await.unwrap();

    // The document lives in Redis under the namespaced key
    let raw = registry
        .remote()
        .get("frequent::product:42")
        .await
        .unwrap()
        .expect("document should be in Redis");
    assert!(raw.contains("\"@type\""));
    assert!(raw.contains("product 42"));

    // A fresh registry on the same Redis sees it without a local copy
    let other = TieredCacheRegistry::connect(&config_for_port(port)).await.unwrap();
    let seen: Option<Product> = other.resolve("frequent").unwrap().get("product:42").await;
    assert_eq!(seen, Some(product(42)));

    let stats = frequent.stats();
    assert_eq!(stats.remote_failures(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_get_or_load_populates_both_tiers() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let registry = TieredCacheRegistry::connect(&config_for_port(port)).await.unwrap();
    let cache = registry.resolve("static").unwrap();

    let loaded: Product = cache
        .get_or_load("product:7", || async { Ok::<_, CacheError>(product(7)) })
        .await
        .unwrap();
    assert_eq!(loaded, product(7));

    // Second call is a remote hit: the loader must not run
    let runs = AtomicUsize::new(0);
    let again: Product = cache
        .get_or_load("product:7", || async {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(product(0))
        })
        .await
        .unwrap();
    assert_eq!(again, product(7));
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let stats = cache.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.remote_hits, 1);
    assert_eq!(stats.local.unwrap().entry_count, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_clear_only_touches_own_namespace() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let registry = TieredCacheRegistry::connect(&config_for_port(port)).await.unwrap();
    let frequent = registry.resolve("frequent").unwrap();
    let stat = registry.resolve("static").unwrap();

    for i in 0..1200u64 {
        frequent.put(&format!("product:{i}"), product(i)).await.unwrap();
    }
    stat.put("product:1", product(1)).await.unwrap();

    frequent.clear().await;

    for i in [0u64, 599, 1199] {
        let raw = registry.remote().get(&format!("frequent::product:{i}")).await.unwrap();
        assert!(raw.is_none(), "frequent::product:{i} should be gone");
    }
    assert_eq!(frequent.local().unwrap().len(), 0);

    let kept: Option<Product> = stat.get("product:1").await;
    assert_eq!(kept, Some(product(1)));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_remote_ttl_expires_documents() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let registry = TieredCacheRegistry::connect(&config_for_port(port)).await.unwrap();
    let remote = registry.remote().clone();

    remote
        .put("realtime::tick", "{\"@type\":\"u64\",\"value\":1}", Some(Duration::from_millis(300)))
        .await
        .unwrap();
    assert!(remote.get("realtime::tick").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(remote.get("realtime::tick").await.unwrap().is_none());
}

// =============================================================================
// Failure scenarios
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_unavailable_at_startup() {
    // Nothing listens here; the registry still builds and serves locally
    let config = config_for_port(1);
    let registry = TieredCacheRegistry::connect_with(&config, &RetryConfig::once())
        .await
        .expect("startup never fails on an unreachable remote");

    let cache = registry.resolve("frequent").unwrap();
    cache.put("product:1", product(1)).await.unwrap();

    let value: Option<Product> = cache.get("product:1").await;
    assert_eq!(value, Some(product(1)));

    let stats = cache.stats();
    assert!(stats.remote_failures() >= 2, "the write and the read both failed remotely");
    assert_eq!(stats.fallback_hits, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_dies_mid_operation() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let registry = Arc::new(TieredCacheRegistry::connect(&config_for_port(port)).await.unwrap());
    let cache = registry.resolve("frequent").unwrap();

    for i in 0..5u64 {
        cache
            .put(&format!("before-kill-{i}"), product(i))
            .await
            .expect("Should write before Redis death");
    }

    // Kill Redis!
    drop(redis);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Reads fall back to the local copies written while Redis was up
    let value: Option<Product> = cache.get("before-kill-2").await;
    assert_eq!(value, Some(product(2)));

    // Writes keep working locally
    for i in 0..5u64 {
        cache
            .put(&format!("after-kill-{i}"), product(100 + i))
            .await
            .expect("Should accept writes with dead Redis");
    }
    let value: Option<Product> = cache.get("after-kill-3").await;
    assert_eq!(value, Some(product(103)));

    // Loads still produce values, they just are not shared
    let loaded: Product = cache
        .get_or_load("never-cached", || async { Ok::<_, CacheError>(product(999)) })
        .await
        .unwrap();
    assert_eq!(loaded, product(999));

    let stats = cache.stats();
    assert!(stats.remote_failures() > 0);
    assert!(stats.fallback_hits >= 2);
}
