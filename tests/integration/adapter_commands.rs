//! Integration tests for the host-facing adapter
//!
//! Tests cover:
//! - Callback completion for get and put
//! - Routing single, metadata-souled and batch payloads
//! - Store commands and pagination
//! - Argument validation before any store call

use crate::integration::test_utils::{fast_cache_config, CountingStore};
use serde_json::{json, Value};
use soulstore::adapter::NodeAdapter;
use soulstore::error::ApiError;
use std::sync::Arc;

async fn adapter() -> (NodeAdapter, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::new());
    let adapter = NodeAdapter::with_store(store.clone(), fast_cache_config()).await;
    (adapter, store)
}

#[tokio::test]
async fn test_callbacks_receive_results() {
    let (adapter, _store) = adapter().await;

    let mut put_result = None;
    adapter
        .put(json!({"people/ann": {"name": "Ann"}}), |r| put_result = Some(r))
        .await;
    assert_eq!(put_result.unwrap().unwrap(), Value::Null);

    let mut got = None;
    adapter.get("people/ann", None, |r| got = Some(r)).await;
    assert_eq!(got.unwrap().unwrap()["name"], "Ann");

    let mut missing = None;
    adapter.get("people/nobody", None, |r| missing = Some(r)).await;
    assert_eq!(missing.unwrap().unwrap(), Value::Null);
}

#[tokio::test]
async fn test_put_routes_by_metadata_soul() {
    let (adapter, store) = adapter().await;

    adapter
        .put_value(json!({"name": "Ann", "_": {"#": "people/ann", ">": {"name": 1}}}))
        .await
        .unwrap();

    let raw: Value = serde_json::from_str(&store.raw("people/ann").await.unwrap()).unwrap();
    assert_eq!(raw["name"], "Ann");
    assert_eq!(raw["_"]["#"], "people/ann");
}

#[tokio::test]
async fn test_put_batch_writes_every_soul() {
    let (adapter, store) = adapter().await;

    adapter
        .put_value(json!({
            "chat/1": {"text": "hi"},
            "chat/2": {"text": "there"}
        }))
        .await
        .unwrap();

    assert_eq!(store.sets("chat/1"), 1);
    assert_eq!(store.sets("chat/2"), 1);
    assert_eq!(adapter.get_value("chat/2", None).await.unwrap()["text"], "there");
}

#[tokio::test]
async fn test_put_rejects_malformed_payloads() {
    let (adapter, store) = adapter().await;

    for payload in [json!("just a string"), json!({"name": "Ann"}), json!({})] {
        let result = adapter.put_value(payload).await;
        assert!(matches!(result, Err(ApiError::MalformedNode(_))));
    }
    assert!(matches!(
        adapter.put_value(json!({"__command": "explode"})).await,
        Err(ApiError::UnknownCommand(_))
    ));
    assert_eq!(store.raw("name").await, None);
}

#[tokio::test]
async fn test_get_projects_a_field() {
    let (adapter, _store) = adapter().await;
    adapter
        .put_value(json!({"name": "Ann", "age": 30, "_": {"#": "p", ">": {"name": 2, "age": 3}}}))
        .await
        .unwrap();

    let value = adapter
        .get_value("p", Some(&json!("age")))
        .await
        .unwrap();
    assert_eq!(value, json!({"age": 30, "_": {"#": "p", ">": {"age": 3}}}));
}

#[tokio::test]
async fn test_empty_key_resolves_null() {
    let (adapter, _store) = adapter().await;
    assert_eq!(adapter.get_value("", None).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_empty_key_resolves_null_even_when_paginating() {
    let (adapter, _store) = adapter().await;
    adapter
        .put_value(json!({"chat/0": {"text": "a"}, "chat/1": {"text": "b"}}))
        .await
        .unwrap();

    let value = adapter
        .get_value("", Some(&json!({"__command": "paginate", "prefix": "chat/"})))
        .await
        .unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_zero_limit_pages_with_default_size() {
    let (adapter, _store) = adapter().await;
    let nodes: serde_json::Map<String, Value> = (0..12)
        .map(|i| (format!("chat/{:02}", i), json!({"n": i})))
        .collect();
    adapter.put_value(Value::Object(nodes)).await.unwrap();

    let page = adapter
        .get_value(
            "chat/",
            Some(&json!({"__command": "paginate", "limit": 0})),
        )
        .await
        .unwrap();
    assert_eq!(page.as_object().unwrap().len(), 10);
}

#[tokio::test]
async fn test_length_excludes_snapshot_key() {
    let (adapter, store) = adapter().await;
    adapter.put_value(json!({"k": {"v": 1}})).await.unwrap();
    assert!(store.raw("persistentCache").await.is_some());

    let length = adapter.put_value(json!({"__command": "length"})).await.unwrap();
    assert_eq!(length, json!(1));
}

#[tokio::test]
async fn test_store_commands_hide_the_snapshot() {
    let (adapter, _store) = adapter().await;
    adapter
        .put_value(json!({"a": {"v": 1}, "b": {"v": 2}}))
        .await
        .unwrap();

    let keys = adapter.put_value(json!({"__command": "keys"})).await.unwrap();
    assert_eq!(keys, json!(["a", "b"]));

    let length = adapter.put_value(json!({"__command": "length"})).await.unwrap();
    assert_eq!(length, json!(2));

    let items = adapter.put_value(json!({"__command": "forEach"})).await.unwrap();
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["key"], "b");
    assert_eq!(items[1]["index"], 1);

    let reserved = adapter
        .put_value(json!({"__command": "remove", "key": "persistentCache"}))
        .await;
    assert!(matches!(reserved, Err(ApiError::MalformedNode(_))));
}

#[tokio::test]
async fn test_set_and_remove_invalidate_cached_node() {
    let (adapter, store) = adapter().await;
    adapter.put_value(json!({"k": {"v": 1}})).await.unwrap();
    assert!(adapter.cache().peek("k").is_some());

    adapter
        .put_value(json!({"__command": "set", "key": "k", "value": {"v": 2}}))
        .await
        .unwrap();
    assert!(adapter.cache().peek("k").is_none());
    assert_eq!(adapter.get_value("k", None).await.unwrap()["v"], 2);

    adapter
        .put_value(json!({"__command": "remove", "key": "k"}))
        .await
        .unwrap();
    assert_eq!(store.raw("k").await, None);
    assert_eq!(adapter.get_value("k", None).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_clear_command_empties_store_and_cache() {
    let (adapter, store) = adapter().await;
    adapter.put_value(json!({"k": {"v": 1}})).await.unwrap();

    adapter.put_value(json!({"__command": "clear"})).await.unwrap();

    assert_eq!(adapter.cache().status().count, 0);
    assert_eq!(store.raw("k").await, None);
    assert_eq!(
        adapter.put_value(json!({"__command": "length"})).await.unwrap(),
        json!(0)
    );
}

#[tokio::test]
async fn test_paginate_through_get_and_put() {
    let (adapter, _store) = adapter().await;
    adapter
        .put_value(json!({
            "chat/1": {"text": "one"},
            "chat/2": {"text": "two"},
            "chat/3": {"text": "three"},
            "other/1": {"text": "nope"}
        }))
        .await
        .unwrap();

    let page = adapter
        .get_value(
            "ignored",
            Some(&json!({"__command": "paginate", "chatId": "chat/", "offset": 1, "limit": 5})),
        )
        .await
        .unwrap();
    let page = page.as_object().unwrap();
    assert_eq!(page.keys().collect::<Vec<_>>(), vec!["chat/2", "chat/3"]);
    assert_eq!(page["chat/3"]["text"], "three");

    let listed = adapter
        .put_value(json!({"__command": "paginate", "key": "chat/", "limit": 2}))
        .await
        .unwrap();
    assert_eq!(listed[0]["key"], "chat/1");
    assert_eq!(listed[1]["data"]["text"], "two");
    assert_eq!(listed.as_array().unwrap().len(), 2);
}
