//! Node Adapter
//!
//! Translates the host's request/completion-callback calling convention into
//! cache operations. `put` payloads carrying a `__command` marker are dispatched
//! straight to the store; everything else is routed by soul to `write` or
//! `batch_write`. All argument validation happens before any I/O.

use crate::cache::CoalescingCache;
use crate::config::{CacheConfig, SoulStoreConfig};
use crate::error::ApiError;
use crate::store::{open_with_retry, KeyValueStore, SledKeyValueStore};
use crate::types::{json_kind, Node, Soul, META_FIELD, SOUL_FIELD, STATE_FIELD};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Marker field selecting a store command instead of a node write
pub const COMMAND_FIELD: &str = "__command";

/// Page size when a paginate request names no limit
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Prefix-filtered, lexicographically sorted key window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub prefix: String,
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Window over `keys`, which must already be sorted.
    pub fn select<'a>(&self, keys: &'a [String]) -> Vec<&'a String> {
        keys.iter()
            .filter(|k| k.starts_with(&self.prefix))
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }

    fn from_fields(prefix: String, fields: &Map<String, Value>) -> Self {
        Self {
            prefix,
            offset: fields.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize,
            // 0 means "unset", like a missing limit
            limit: fields
                .get("limit")
                .and_then(Value::as_u64)
                .filter(|&l| l > 0)
                .map(|l| l as usize)
                .unwrap_or(DEFAULT_PAGE_LIMIT),
        }
    }
}

/// Store command carried by a `put` payload
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Remove { key: String },
    Clear,
    Keys,
    Length,
    ForEach,
    Set { key: String, value: String },
    Paginate(Page),
}

impl Command {
    /// Parse the command marker, if any. Missing arguments are `MalformedNode`.
    pub fn parse(fields: &Map<String, Value>) -> Result<Option<Self>, ApiError> {
        let Some(marker) = fields.get(COMMAND_FIELD) else {
            return Ok(None);
        };
        let name = marker
            .as_str()
            .ok_or_else(|| ApiError::UnknownCommand(marker.to_string()))?;

        let key = || {
            fields
                .get("key")
                .and_then(Value::as_str)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ApiError::MalformedNode(format!("{} requires key", name)))
        };

        let command = match name {
            "remove" => Command::Remove { key: key()? },
            "clear" => Command::Clear,
            "keys" => Command::Keys,
            "length" => Command::Length,
            "forEach" => Command::ForEach,
            "set" => {
                let key = key()?;
                let value = match fields.get("value") {
                    None => {
                        return Err(ApiError::MalformedNode(
                            "set requires key and value".to_string(),
                        ))
                    }
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                Command::Set { key, value }
            }
            "paginate" => Command::Paginate(Page::from_fields(key()?, fields)),
            other => return Err(ApiError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Where a non-command `put` payload goes
#[derive(Debug, Clone, PartialEq)]
pub enum PutRoute {
    Single(Soul, Node),
    Batch(BTreeMap<Soul, Node>),
}

impl PutRoute {
    /// A node naming its own soul in `_` is a single write. Otherwise every
    /// top-level field must be a soul mapping to a node.
    pub fn resolve(fields: Map<String, Value>) -> Result<Self, ApiError> {
        let node = Node::from_map(fields);
        if let Some(soul) = node.soul() {
            return Ok(PutRoute::Single(soul.to_string(), node));
        }

        let mut souls = BTreeMap::new();
        for (soul, value) in node.into_map() {
            if soul == META_FIELD {
                continue;
            }
            match value {
                Value::Object(child) => {
                    souls.insert(soul, Node::from_map(child));
                }
                other => {
                    return Err(ApiError::MalformedNode(format!(
                        "missing soul: field '{}' is a {}, not a node",
                        soul,
                        json_kind(&other)
                    )))
                }
            }
        }

        if souls.len() > 1 {
            return Ok(PutRoute::Batch(souls));
        }
        match souls.pop_first() {
            Some((soul, node)) => Ok(PutRoute::Single(soul, node)),
            None => Err(ApiError::MalformedNode("missing soul in node".to_string())),
        }
    }
}

/// Host-facing adapter over the coalescing cache.
#[derive(Clone)]
pub struct NodeAdapter {
    cache: CoalescingCache,
}

impl NodeAdapter {
    pub fn new(cache: CoalescingCache) -> Self {
        Self { cache }
    }

    /// Full startup: open the sled store with retries, warm the cache, preload
    /// configured hot keys.
    pub async fn open(config: &SoulStoreConfig, workspace_root: &Path) -> Result<Self, ApiError> {
        let path = config.storage.resolve_path(workspace_root);
        info!(path = %path.display(), "Opening node store");
        let store = open_with_retry(&config.storage, || {
            let path = path.clone();
            async move { SledKeyValueStore::open(path) }
        })
        .await?;
        Ok(Self::with_store(Arc::new(store), config.cache.clone()).await)
    }

    /// Warm a cache over an already-open store and preload hot keys.
    pub async fn with_store(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        let cache = CoalescingCache::open(store, config).await;
        let hot_keys = cache.config().preload_keys.clone();
        if !hot_keys.is_empty() {
            cache.preload(&hot_keys).await;
        }
        Self { cache }
    }

    pub fn cache(&self) -> &CoalescingCache {
        &self.cache
    }

    /// Callback form of [`NodeAdapter::get_value`].
    pub async fn get<F>(&self, key: &str, field: Option<&Value>, done: F)
    where
        F: FnOnce(Result<Value, ApiError>),
    {
        let result = self.get_value(key, field).await;
        if let Err(e) = &result {
            error!(key, error = %e, "get failed");
        }
        done(result)
    }

    /// Resolve a node (or `null`), a single projected field, or a page of nodes.
    ///
    /// `field` may be a field name, which narrows the node to that field and
    /// its state, or a `{"__command": "paginate", ...}` object. An empty key
    /// resolves `null` whatever the field.
    pub async fn get_value(&self, key: &str, field: Option<&Value>) -> Result<Value, ApiError> {
        debug!(key, field = ?field, "get called");
        if key.is_empty() {
            return Ok(Value::Null);
        }

        if let Some(Value::Object(fields)) = field {
            if fields.get(COMMAND_FIELD).and_then(Value::as_str) == Some("paginate") {
                let prefix = fields
                    .get("prefix")
                    .or_else(|| fields.get("chatId"))
                    .and_then(Value::as_str)
                    .unwrap_or(key)
                    .to_string();
                let page = Page::from_fields(prefix, fields);
                let mut result = Map::new();
                for (soul, data) in self.read_page(&page).await? {
                    result.insert(soul, data);
                }
                return Ok(Value::Object(result));
            }
        }

        let node = self.cache.read(key).await?;
        Ok(match (node, field) {
            (None, _) => Value::Null,
            (Some(node), Some(Value::String(name))) => project(&node, name),
            (Some(node), _) => node.into_value(),
        })
    }

    /// Callback form of [`NodeAdapter::put_value`].
    pub async fn put<F>(&self, node: Value, done: F)
    where
        F: FnOnce(Result<Value, ApiError>),
    {
        let result = self.put_value(node).await;
        if let Err(e) = &result {
            error!(error = %e, "put failed");
        }
        done(result)
    }

    /// Run a store command, or merge-write the node(s). Writes resolve `null`.
    pub async fn put_value(&self, node: Value) -> Result<Value, ApiError> {
        debug!(node = %node, "put called");
        let fields = match node {
            Value::Object(fields) => fields,
            other => {
                return Err(ApiError::MalformedNode(format!(
                    "invalid node: expected an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        if let Some(command) = Command::parse(&fields)? {
            return self.run_command(command).await;
        }

        match PutRoute::resolve(fields)? {
            PutRoute::Single(soul, node) => {
                self.cache.write(&soul, &node).await?;
            }
            PutRoute::Batch(nodes) => {
                self.cache.batch_write(&nodes).await?;
            }
        }
        Ok(Value::Null)
    }

    /// Execute a store command against the underlying store.
    ///
    /// The snapshot key is hidden from `keys`, `length`, `forEach` and
    /// `paginate`, and cannot be the target of `remove` or `set`.
    pub async fn run_command(&self, command: Command) -> Result<Value, ApiError> {
        let store = self.cache.store();
        let snapshot_key = self.cache.snapshot_key();
        debug!(command = ?command, "Running store command");

        match command {
            Command::Remove { key } => {
                self.reject_snapshot_key(&key)?;
                store.remove(&key).await?;
                self.cache.invalidate(&key).await;
                Ok(Value::Null)
            }
            Command::Clear => {
                store.clear().await?;
                self.cache.clear().await?;
                Ok(Value::Null)
            }
            Command::Keys => Ok(json!(self.visible_keys().await?)),
            Command::Length => {
                let total = store.length().await?;
                let snapshot = usize::from(store.get(snapshot_key).await?.is_some());
                Ok(json!(total.saturating_sub(snapshot)))
            }
            Command::ForEach => {
                let mut items = Vec::new();
                store
                    .for_each(&mut |value: &str, key: &str, _index: usize| {
                        if key != snapshot_key {
                            let index = items.len();
                            items.push(json!({"key": key, "value": value, "index": index}));
                        }
                    })
                    .await?;
                Ok(Value::Array(items))
            }
            Command::Set { key, value } => {
                self.reject_snapshot_key(&key)?;
                store.set(&key, &value).await?;
                self.cache.invalidate(&key).await;
                Ok(Value::Null)
            }
            Command::Paginate(page) => {
                let items = self
                    .read_page(&page)
                    .await?
                    .into_iter()
                    .map(|(key, data)| json!({"key": key, "data": data}))
                    .collect();
                Ok(Value::Array(items))
            }
        }
    }

    async fn visible_keys(&self) -> Result<Vec<String>, ApiError> {
        let snapshot_key = self.cache.snapshot_key();
        let mut keys = self.cache.store().keys().await?;
        keys.retain(|k| k != snapshot_key);
        Ok(keys)
    }

    async fn read_page(&self, page: &Page) -> Result<Vec<(String, Value)>, ApiError> {
        let mut keys = self.visible_keys().await?;
        keys.sort();
        let selected = page.select(&keys);
        let values = futures::future::try_join_all(selected.iter().map(|k| self.cache.read(k))).await?;
        Ok(selected
            .into_iter()
            .cloned()
            .zip(values)
            .map(|(key, node)| (key, node.map(Node::into_value).unwrap_or(Value::Null)))
            .collect())
    }

    fn reject_snapshot_key(&self, key: &str) -> Result<(), ApiError> {
        if key == self.cache.snapshot_key() {
            return Err(ApiError::MalformedNode(format!(
                "'{}' is reserved for the cache snapshot",
                key
            )));
        }
        Ok(())
    }
}

/// Narrow a node to one field, keeping its soul and that field's state.
fn project(node: &Node, field: &str) -> Value {
    let mut out = Map::new();
    if let Some(value) = node.get(field) {
        out.insert(field.to_string(), value.clone());
    }
    let mut meta = Map::new();
    if let Some(soul) = node.soul() {
        meta.insert(SOUL_FIELD.to_string(), Value::String(soul.to_string()));
    }
    let mut states = Map::new();
    if let Some(state) = node.states().get(field) {
        states.insert(field.to_string(), state.clone());
    }
    meta.insert(STATE_FIELD.to_string(), Value::Object(states));
    out.insert(META_FIELD.to_string(), Value::Object(meta));
    Value::Object(out)
}
