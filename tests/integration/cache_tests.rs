//! Integration tests for the TTL cache engine
//!
//! These tests run the engine against real SQLite files in a temporary
//! directory and drive expiry with a manual clock.

use focusmine::cache::{CacheEngine, CachedValue, ManualClock};
use focusmine::config::CacheConfig;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Creates a file-backed cache configuration inside `dir`
fn file_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        database_path: dir.path().join("cache.sqlite").to_string_lossy().to_string(),
        ..CacheConfig::default()
    }
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = file_config(&dir);
    let clock = Arc::new(ManualClock::new(1_000_000));

    let cache = CacheEngine::new(&config).with_clock(clock.clone());
    cache.set("forever", &json!({"a": 1}), 0, "ns").await.unwrap();
    cache.set("short", &"v", 10, "ns").await.unwrap();
    cache.close().await.unwrap();

    let reopened = CacheEngine::new(&config).with_clock(clock.clone());
    assert_eq!(
        reopened.get("forever", "ns").await.unwrap(),
        Some(CachedValue::Json(json!({"a": 1})))
    );
    assert_eq!(reopened.ttl("short", "ns").await.unwrap(), 10);

    clock.advance(11 * 60);
    assert_eq!(reopened.get("short", "ns").await.unwrap(), None);
    assert_eq!(reopened.ttl("forever", "ns").await.unwrap(), 0);
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_engine_reopens_on_demand() {
    let dir = TempDir::new().unwrap();
    let cache = CacheEngine::new(&file_config(&dir));

    cache.set("k", &1, 0, "ns").await.unwrap();
    cache.close().await.unwrap();
    assert!(!cache.is_open().await);

    assert_eq!(cache.get_json::<i64>("k", "ns").await.unwrap(), Some(1));
    assert!(cache.is_open().await);
    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_large_payloads_are_compressed() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        gzip_threshold_bytes: 256,
        ..file_config(&dir)
    };
    let cache = CacheEngine::new(&config);

    let article = "chip sales rose again this quarter. ".repeat(200);
    cache.set("big", &article, 0, "pages").await.unwrap();
    cache.set("small", &"tiny", 0, "pages").await.unwrap();

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.compressed_entries, 1);
    assert!(stats.total_bytes < article.len() as u64);

    assert_eq!(cache.get_json::<String>("big", "pages").await.unwrap(), Some(article));
    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() {
    let config = CacheConfig {
        gzip_threshold_bytes: 64,
        max_item_bytes: 256,
        ..CacheConfig::default()
    };
    let cache = CacheEngine::in_memory(&config);

    let numbers: Vec<u64> = (0..5_000).map(|i| i * 7_919 % 100_003).collect();
    assert!(!cache.set("huge", &numbers, 0, "ns").await.unwrap());
    assert_eq!(cache.get("huge", "ns").await.unwrap(), None);

    assert!(cache.set("fits", &[1, 2, 3], 0, "ns").await.unwrap());
}

#[tokio::test]
async fn test_bytes_round_trip() {
    let cache = CacheEngine::in_memory(&CacheConfig::default());
    let payload = vec![0u8, 159, 146, 150, 255];

    cache.set_bytes("blob", payload.clone(), 0, "ns").await.unwrap();

    assert_eq!(
        cache.get("blob", "ns").await.unwrap(),
        Some(CachedValue::Bytes(payload))
    );
    assert_eq!(cache.get_json::<String>("blob", "ns").await.unwrap(), None);
}

#[tokio::test]
async fn test_namespaces_are_independent() {
    let cache = CacheEngine::in_memory(&CacheConfig::default());

    cache.set("hash-1", &true, 0, "focus_a").await.unwrap();
    cache.set("hash-2", &true, 0, "focus_a").await.unwrap();
    cache.set("hash-1", &true, 0, "focus_b").await.unwrap();

    assert_eq!(
        cache.keys("hash-*", "focus_a").await.unwrap(),
        vec!["hash-1".to_string(), "hash-2".to_string()]
    );
    assert!(cache.delete("hash-1", "focus_b").await.unwrap());
    assert!(!cache.delete("hash-1", "focus_b").await.unwrap());
    assert_eq!(cache.keys("*", "focus_a").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_ttl_only_touches_live_entries() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = CacheEngine::in_memory(&CacheConfig::default()).with_clock(clock.clone());

    cache.set("page", &"html", 5, "pages").await.unwrap();
    assert!(cache.update_ttl("page", 15 * 24 * 60, "pages").await.unwrap());
    assert_eq!(cache.ttl("page", "pages").await.unwrap(), 21_600);

    assert!(cache.update_ttl("page", 0, "pages").await.unwrap());
    assert_eq!(cache.ttl("page", "pages").await.unwrap(), 0);

    cache.set("stale", &"html", 1, "pages").await.unwrap();
    clock.advance(120);
    assert!(!cache.update_ttl("stale", 60, "pages").await.unwrap());
    assert!(!cache.update_ttl("missing", 60, "pages").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(CacheEngine::new(&file_config(&dir)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.set_if_absent("chunk-hash", &true, 0, "focus_x").await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    cache.close().await.unwrap();
}

#[tokio::test]
async fn test_sweep_removes_only_expired() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = CacheEngine::in_memory(&CacheConfig::default()).with_clock(clock.clone());

    for i in 0..10 {
        cache.set(&format!("short-{}", i), &i, 1, "ns").await.unwrap();
    }
    cache.set("long", &"v", 60, "ns").await.unwrap();
    cache.set("forever", &"v", 0, "other").await.unwrap();

    clock.advance(5 * 60);
    assert_eq!(cache.sweep().await.unwrap(), 10);

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.expired_entries, 0);
}

#[tokio::test]
async fn test_ttl_in_final_second_is_not_permanent() {
    let clock = Arc::new(ManualClock::new(1_000));
    let cache = CacheEngine::in_memory(&CacheConfig::default()).with_clock(clock.clone());

    cache.set("k", &"v", 1, "ns").await.unwrap();
    clock.advance(60);
    assert_eq!(cache.ttl("k", "ns").await.unwrap(), 1);

    clock.advance(1);
    assert_eq!(cache.ttl("k", "ns").await.unwrap(), -1);
}
