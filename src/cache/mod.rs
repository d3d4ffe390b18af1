//! Coalescing Cache
//!
//! Single in-process view of node data in front of a slow [`KeyValueStore`].
//! Reads of an uncached key are parked as waiters behind a per-key debounce
//! timer; when it fires, one store `get` resolves every waiter registered so
//! far. Writes read through the cache, merge, and write back. The whole map is
//! mirrored into a snapshot key so a restart can warm up without re-reading
//! every soul.
//!
//! Per-key lifecycle: absent -> pending (waiters queued, timer armed) ->
//! fetching (timer fired, store call in flight) -> cached. Readers arriving
//! while a fetch is in flight start a new pending entry rather than joining
//! the in-flight one.
//!
//! Locks are never held across an `.await`; everything between two suspension
//! points is atomic with respect to other cache operations.

mod footprint;
pub mod snapshot;

pub use snapshot::CacheEntry;

use crate::config::CacheConfig;
use crate::error::{ApiError, StoreError};
use crate::merge::merge;
use crate::store::KeyValueStore;
use crate::types::{now_millis, Node, Soul};
use futures::future::{join_all, try_join_all};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type ReadResult = Result<Option<Node>, StoreError>;

/// Counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from memory
    pub hits: u64,
    /// Reads that had to wait for a fetch
    pub misses: u64,
    /// Reads that joined an already-armed timer
    pub coalesced: u64,
    /// Store `get` calls issued for node data
    pub fetches: u64,
    /// Fetches that failed
    pub fetch_failures: u64,
    /// Successful node writes
    pub writes: u64,
    pub snapshot_writes: u64,
    pub snapshot_failures: u64,
}

/// Point-in-time size of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Cached keys
    pub count: usize,
    /// Estimated bytes held by cached entries
    pub bytes: usize,
    /// Keys with waiters parked behind a debounce timer
    pub pending: usize,
}

/// Coalescing, write-merging cache over a key-value store.
///
/// Clones share the same map, pending table and store.
#[derive(Clone)]
pub struct CoalescingCache {
    store: Arc<dyn KeyValueStore>,
    entries: Arc<RwLock<BTreeMap<Soul, CacheEntry>>>,
    pending: Arc<Mutex<HashMap<Soul, Vec<oneshot::Sender<ReadResult>>>>>,
    stats: Arc<RwLock<CacheStats>>,
    config: CacheConfig,
}

impl CoalescingCache {
    /// Create a cold cache. Prefer [`CoalescingCache::open`], which also warms it.
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            config,
        }
    }

    /// Create a cache and warm it from the persisted snapshot.
    pub async fn open(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        let cache = Self::new(store, config);
        cache.warm_start().await;
        cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn snapshot_key(&self) -> &str {
        &self.config.snapshot_key
    }

    /// Read a node, coalescing concurrent misses for the same key into one fetch.
    pub async fn read(&self, key: &str) -> Result<Option<Node>, ApiError> {
        self.check_key(key)?;

        if let Some(data) = self.lookup(key) {
            debug!(key, "Cache hit");
            self.stats.write().hits += 1;
            return Ok(data);
        }

        let waiter = self.park_reader(key);
        let result = waiter.await.map_err(|_| StoreError::Closed)?;
        Ok(result?)
    }

    /// Merge `partial` into the stored node and write the result back.
    ///
    /// Returns the merged node. If the store `set` fails nothing is cached or
    /// snapshotted.
    pub async fn write(&self, key: &str, partial: &Node) -> Result<Node, ApiError> {
        self.check_key(key)?;

        let current = self.read(key).await?;
        let merged = merge(current.as_ref(), Some(partial)).unwrap_or_else(|| partial.clone());
        let serialized = serde_json::to_string(&merged).map_err(StoreError::from)?;

        self.store.set(key, &serialized).await?;
        self.entries
            .write()
            .insert(key.to_string(), CacheEntry::new(Some(merged.clone()), now_millis()));
        self.stats.write().writes += 1;
        debug!(key, fields = merged.fields().count(), "Node written");

        self.persist_snapshot().await;
        Ok(merged)
    }

    /// Merge and write several nodes; store writes fan out concurrently and
    /// the snapshot is rewritten once at the end.
    ///
    /// Keys whose `set` succeeded are cached even when another key failed; the
    /// first failure is returned.
    pub async fn batch_write(
        &self,
        nodes: &BTreeMap<Soul, Node>,
    ) -> Result<BTreeMap<Soul, Node>, ApiError> {
        for key in nodes.keys() {
            self.check_key(key)?;
        }

        let currents = try_join_all(nodes.keys().map(|key| self.read(key))).await?;

        let mut prepared = Vec::with_capacity(nodes.len());
        for ((key, partial), current) in nodes.iter().zip(currents) {
            let merged =
                merge(current.as_ref(), Some(partial)).unwrap_or_else(|| partial.clone());
            let serialized = serde_json::to_string(&merged).map_err(StoreError::from)?;
            prepared.push((key.clone(), merged, serialized));
        }

        let results = join_all(
            prepared
                .iter()
                .map(|(key, _, serialized)| self.store.set(key, serialized)),
        )
        .await;

        let mut written = BTreeMap::new();
        let mut first_error = None;
        {
            let now = now_millis();
            let mut entries = self.entries.write();
            for ((key, merged, _), result) in prepared.into_iter().zip(results) {
                match result {
                    Ok(()) => {
                        entries.insert(key.clone(), CacheEntry::new(Some(merged.clone()), now));
                        written.insert(key, merged);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Batch write failed for key");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        self.stats.write().writes += written.len() as u64;
        info!(
            requested = nodes.len(),
            written = written.len(),
            "Batch write completed"
        );

        if !written.is_empty() {
            self.persist_snapshot().await;
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(written),
        }
    }

    /// Drop every cached entry and remove the persisted snapshot.
    ///
    /// Other keys in the store are untouched.
    pub async fn clear(&self) -> Result<(), ApiError> {
        let dropped = {
            let mut entries = self.entries.write();
            let n = entries.len();
            entries.clear();
            n
        };
        self.store.remove(&self.config.snapshot_key).await?;
        info!(dropped, "Cache cleared");
        Ok(())
    }

    /// Forget one key so the next read goes to the store. Returns whether it was cached.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            debug!(key, "Cache entry invalidated");
            self.persist_snapshot().await;
        }
        removed
    }

    /// Load the persisted snapshot, drop expired entries and rewrite it.
    ///
    /// Never fails: any problem is logged and the cache stays as it was.
    /// Returns the number of entries restored.
    pub async fn warm_start(&self) -> usize {
        let raw = match self.store.get(&self.config.snapshot_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No cache snapshot to restore");
                return 0;
            }
            Err(e) => {
                error!(error = %e, "Failed to read cache snapshot; starting empty");
                return 0;
            }
        };
        let loaded = match snapshot::decode(&raw) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "Failed to parse cache snapshot; starting empty");
                return 0;
            }
        };

        let now = now_millis();
        let total = loaded.len();
        let mut restored = 0;
        {
            let mut entries = self.entries.write();
            for (key, entry) in loaded {
                if self.is_expired(&entry, now) {
                    continue;
                }
                entries.entry(key).or_insert(entry);
                restored += 1;
            }
        }
        info!(restored, expired = total - restored, "Cache restored from snapshot");

        self.persist_snapshot().await;
        restored
    }

    /// Read the given keys into the cache. Failures are logged, not returned.
    pub async fn preload(&self, keys: &[String]) -> usize {
        let results = join_all(keys.iter().map(|key| self.read(key))).await;
        let mut loaded = 0;
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(Some(_)) => {
                    info!(key = %key, "Preloaded hot key");
                    loaded += 1;
                }
                Ok(None) => debug!(key = %key, "Preload key not in store"),
                Err(e) => warn!(key = %key, error = %e, "Failed to preload key"),
            }
        }
        loaded
    }

    /// Estimated bytes held by the in-memory map
    pub fn memory_footprint(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| footprint::entry_bytes(key, entry))
            .sum()
    }

    pub fn status(&self) -> CacheStatus {
        let (count, bytes) = {
            let entries = self.entries.read();
            let bytes = entries
                .iter()
                .map(|(key, entry)| footprint::entry_bytes(key, entry))
                .sum();
            (entries.len(), bytes)
        };
        CacheStatus {
            count,
            bytes,
            pending: self.pending.lock().len(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Cached entry for `key`, ignoring expiry
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn cached_keys(&self) -> Vec<Soul> {
        self.entries.read().keys().cloned().collect()
    }

    fn check_key(&self, key: &str) -> Result<(), ApiError> {
        if key.is_empty() {
            return Err(ApiError::MalformedNode("empty soul".to_string()));
        }
        if key == self.config.snapshot_key {
            return Err(ApiError::MalformedNode(format!(
                "'{}' is reserved for the cache snapshot",
                key
            )));
        }
        Ok(())
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        match self.config.ttl() {
            Some(ttl) => entry.age_ms(now) as u128 >= ttl.as_millis(),
            None => false,
        }
    }

    /// Unexpired cached value; expired entries are evicted on the way.
    fn lookup(&self, key: &str) -> Option<Option<Node>> {
        let now = now_millis();
        let mut entries = self.entries.write();
        let expired = self.is_expired(entries.get(key)?, now);
        if expired {
            debug!(key, "Cache entry expired");
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.data.clone())
    }

    /// Queue a waiter for `key`, arming the debounce timer if none is armed.
    fn park_reader(&self, key: &str) -> oneshot::Receiver<ReadResult> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        let mut stats = self.stats.write();
        stats.misses += 1;

        if let Some(waiters) = pending.get_mut(key) {
            waiters.push(tx);
            stats.coalesced += 1;
            return rx;
        }

        pending.insert(key.to_string(), vec![tx]);
        let cache = self.clone();
        let key = key.to_string();
        let debounce = self.config.debounce();
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            cache.fetch(&key).await;
        });
        rx
    }

    /// Timer body: take the waiters, fetch once, cache, snapshot, resolve.
    async fn fetch(&self, key: &str) {
        let waiters = self.pending.lock().remove(key).unwrap_or_default();
        self.stats.write().fetches += 1;
        debug!(key, waiters = waiters.len(), "Fetching from store");

        let result = self.load_from_store(key).await;
        match &result {
            Ok(data) => {
                self.entries
                    .write()
                    .insert(key.to_string(), CacheEntry::new(data.clone(), now_millis()));
                self.persist_snapshot().await;
            }
            Err(e) => {
                self.stats.write().fetch_failures += 1;
                warn!(key, error = %e, waiters = waiters.len(), "Store fetch failed");
            }
        }

        for waiter in waiters {
            // a dropped reader is not an error
            let _ = waiter.send(result.clone());
        }
    }

    async fn load_from_store(&self, key: &str) -> ReadResult {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw)? {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(Node::from_map(map))),
            other => Err(StoreError::Data(format!(
                "value under '{}' is not a node: {}",
                key,
                crate::types::json_kind(&other)
            ))),
        }
    }

    /// Rewrite the snapshot key. Best effort: failures are logged and counted.
    async fn persist_snapshot(&self) {
        let encoded = snapshot::encode(&self.entries.read());
        let result = match encoded {
            Ok(raw) => self.store.set(&self.config.snapshot_key, &raw).await,
            Err(e) => Err(StoreError::from(e)),
        };
        let mut stats = self.stats.write();
        match result {
            Ok(()) => stats.snapshot_writes += 1,
            Err(e) => {
                stats.snapshot_failures += 1;
                warn!(error = %e, "Failed to persist cache snapshot");
            }
        }
    }
}
