//! Persisted cache snapshot format.
//!
//! The whole in-memory map is stored under one reserved key as a JSON array of
//! `[key, {"data": node | null, "timestamp": ms}]` pairs, in key order.

use crate::types::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cached copy of a fully merged node (or of a confirmed miss).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Option<Node>,
    /// Milliseconds since the epoch when the entry was last refreshed
    pub timestamp: u64,
}

impl CacheEntry {
    pub fn new(data: Option<Node>, timestamp: u64) -> Self {
        Self { data, timestamp }
    }

    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

pub(crate) fn encode(entries: &BTreeMap<String, CacheEntry>) -> Result<String, serde_json::Error> {
    let pairs: Vec<(&String, &CacheEntry)> = entries.iter().collect();
    serde_json::to_string(&pairs)
}

pub(crate) fn decode(raw: &str) -> Result<Vec<(String, CacheEntry)>, serde_json::Error> {
    serde_json::from_str(raw)
}
