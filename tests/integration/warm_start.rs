//! Integration tests for snapshot restore across restarts

use crate::integration::test_utils::{fast_cache_config, snapshot_pairs, CountingStore};
use serde_json::json;
use soulstore::cache::CoalescingCache;
use soulstore::config::CacheConfig;
use soulstore::types::{now_millis, Node};
use std::sync::Arc;

const HOUR_MS: u64 = 60 * 60 * 1000;

#[tokio::test]
async fn test_restart_serves_from_snapshot() {
    let store = Arc::new(CountingStore::new());
    {
        let cache = CoalescingCache::open(store.clone(), fast_cache_config()).await;
        cache
            .write("k", &Node::new().with_field("v", json!(1), 1))
            .await
            .unwrap();
    }
    let gets_before = store.gets("k");

    let cache = CoalescingCache::open(store.clone(), fast_cache_config()).await;
    let node = cache.read("k").await.unwrap().unwrap();

    assert_eq!(node.get("v"), Some(&json!(1)));
    assert_eq!(store.gets("k"), gets_before);
}

#[tokio::test]
async fn test_warm_start_prunes_expired_entries() {
    let store = Arc::new(CountingStore::new());
    let config = fast_cache_config();
    let now = now_millis();
    store
        .seed(
            &config.snapshot_key,
            json!([
                ["fresh", {"data": {"v": 1}, "timestamp": now - HOUR_MS}],
                ["stale", {"data": {"v": 2}, "timestamp": now - 25 * HOUR_MS}],
                ["absent", {"data": null, "timestamp": now}]
            ]),
        )
        .await;

    let cache = CoalescingCache::new(store.clone(), config.clone());
    assert_eq!(cache.warm_start().await, 2);

    let mut keys = cache.cached_keys();
    keys.sort();
    assert_eq!(keys, vec!["absent".to_string(), "fresh".to_string()]);

    // the snapshot is rewritten without the expired entry
    let pairs = snapshot_pairs(&store, &config.snapshot_key).await;
    let persisted: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(persisted, vec!["absent", "fresh"]);
}

#[tokio::test]
async fn test_zero_ttl_never_expires() {
    let store = Arc::new(CountingStore::new());
    let config = CacheConfig {
        ttl_ms: 0,
        ..fast_cache_config()
    };
    store
        .seed(
            &config.snapshot_key,
            json!([["ancient", {"data": {"v": 1}, "timestamp": 0}]]),
        )
        .await;

    let cache = CoalescingCache::open(store.clone(), config).await;
    assert!(cache.read("ancient").await.unwrap().is_some());
    assert_eq!(store.gets("ancient"), 0);
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let store = Arc::new(CountingStore::new());
    let config = fast_cache_config();
    store
        .seed(&config.snapshot_key, json!({"not": "a list of pairs"}))
        .await;
    store.seed("k", json!({"v": 1})).await;

    let cache = CoalescingCache::open(store.clone(), config).await;
    assert_eq!(cache.status().count, 0);

    // still fully usable
    assert!(cache.read("k").await.unwrap().is_some());
}

#[tokio::test]
async fn test_expired_entry_is_refetched_on_read() {
    let store = Arc::new(CountingStore::new());
    let config = CacheConfig {
        ttl_ms: 1,
        ..fast_cache_config()
    };
    store.seed("k", json!({"v": 1})).await;
    let cache = CoalescingCache::new(store.clone(), config);

    cache.read("k").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    cache.read("k").await.unwrap();

    assert_eq!(store.gets("k"), 2);
}

#[tokio::test]
async fn test_preload_warms_hot_keys() {
    let store = Arc::new(CountingStore::new());
    store.seed("hot/a", json!({"v": 1})).await;
    let cache = CoalescingCache::new(store.clone(), fast_cache_config());

    let loaded = cache
        .preload(&["hot/a".to_string(), "hot/missing".to_string()])
        .await;
    assert_eq!(loaded, 1);

    cache.read("hot/a").await.unwrap();
    assert_eq!(store.gets("hot/a"), 1);
}
