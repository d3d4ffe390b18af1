//! Best-effort memory accounting for cached nodes.
//!
//! Sizes approximate a JavaScript-style heap: strings cost two bytes per code
//! unit, numbers eight, booleans four. Container overhead is ignored.

use crate::cache::snapshot::CacheEntry;
use serde_json::Value;

const STRING_UNIT_BYTES: usize = 2;
const NUMBER_BYTES: usize = 8;
const BOOL_BYTES: usize = 4;

pub(crate) fn string_bytes(s: &str) -> usize {
    s.encode_utf16().count() * STRING_UNIT_BYTES
}

pub(crate) fn value_bytes(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Bool(_) => BOOL_BYTES,
        Value::Number(_) => NUMBER_BYTES,
        Value::String(s) => string_bytes(s),
        Value::Array(items) => items.iter().map(value_bytes).sum(),
        Value::Object(map) => map
            .iter()
            .map(|(field, v)| string_bytes(field) + value_bytes(v))
            .sum(),
    }
}

/// Key, timestamp and node payload of one cache entry.
pub(crate) fn entry_bytes(key: &str, entry: &CacheEntry) -> usize {
    let data = entry
        .data
        .as_ref()
        .map(|node| {
            node.as_map()
                .iter()
                .map(|(field, v)| string_bytes(field) + value_bytes(v))
                .sum()
        })
        .unwrap_or(0);
    string_bytes(key) + NUMBER_BYTES + data
}
