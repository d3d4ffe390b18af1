//! CLI route: single route table and run context.

use crate::adapter::{Command, NodeAdapter, Page};
use crate::cli::parse::Commands;
use crate::cli::presentation::{format_status_json, format_status_text, StatusReport};
use crate::config::{ConfigLoader, SoulStoreConfig};
use crate::error::ApiError;
use crate::store::{open_with_retry, SledKeyValueStore};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runtime context for CLI execution: loaded config, the open store and the adapter over it.
pub struct RunContext {
    adapter: NodeAdapter,
    store: Arc<SledKeyValueStore>,
    store_path: PathBuf,
    config: SoulStoreConfig,
}

impl RunContext {
    /// Load config, open the sled store (with retries) and warm the cache.
    pub async fn open(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };

        let store_path = config.storage.resolve_path(&workspace_root);
        let store = open_with_retry(&config.storage, || {
            let path = store_path.clone();
            async move { SledKeyValueStore::open(path) }
        })
        .await?;
        let store = Arc::new(store);
        let adapter = NodeAdapter::with_store(store.clone(), config.cache.clone()).await;

        Ok(Self {
            adapter,
            store,
            store_path,
            config,
        })
    }

    pub fn adapter(&self) -> &NodeAdapter {
        &self.adapter
    }

    pub fn config(&self) -> &SoulStoreConfig {
        &self.config
    }

    /// Run one command and return its rendered output. The store is flushed afterwards.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let output = self.dispatch(command).await?;
        self.store.flush()?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Command finished");
        Ok(output)
    }

    async fn dispatch(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Get { key, field } => {
                let field = field.clone().map(Value::String);
                let value = self.adapter.get_value(key, field.as_ref()).await?;
                Ok(render(&value))
            }
            Commands::Put { node, soul } => {
                let payload: Value = serde_json::from_str(node)
                    .map_err(|e| ApiError::MalformedNode(format!("invalid JSON: {}", e)))?;
                let payload = match soul {
                    Some(soul) => {
                        let mut wrapped = Map::new();
                        wrapped.insert(soul.clone(), payload);
                        Value::Object(wrapped)
                    }
                    None => payload,
                };
                let value = self.adapter.put_value(payload).await?;
                Ok(render(&value))
            }
            Commands::Remove { key } => {
                self.adapter
                    .run_command(Command::Remove { key: key.clone() })
                    .await?;
                info!(key = %key, "Removed store key");
                Ok(format!("Removed {}", key))
            }
            Commands::Keys { prefix } => {
                let keys = self.adapter.run_command(Command::Keys).await?;
                let keys: Vec<&str> = keys
                    .as_array()
                    .map(|items| items.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                Ok(keys
                    .into_iter()
                    .filter(|k| prefix.as_deref().map_or(true, |p| k.starts_with(p)))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Commands::Paginate {
                prefix,
                offset,
                limit,
            } => {
                let page = Page {
                    prefix: prefix.clone(),
                    offset: *offset,
                    limit: *limit,
                };
                let value = self.adapter.run_command(Command::Paginate(page)).await?;
                Ok(render(&value))
            }
            Commands::Status { format } => {
                let report = self.status_report().await?;
                match format.as_str() {
                    "json" => Ok(format_status_json(&report)),
                    "text" => Ok(format_status_text(&report)),
                    other => Err(ApiError::ConfigError(format!(
                        "Invalid format: {} (must be 'text' or 'json')",
                        other
                    ))),
                }
            }
            Commands::ClearCache => {
                let dropped = self.adapter.cache().status().count;
                self.adapter.cache().clear().await?;
                Ok(format!("Cleared {} cached entries", dropped))
            }
        }
    }

    async fn status_report(&self) -> Result<StatusReport, ApiError> {
        let length = self.adapter.run_command(Command::Length).await?;
        let cache = self.adapter.cache();
        Ok(StatusReport {
            store_path: self.store_path.display().to_string(),
            store_keys: length.as_u64().unwrap_or(0) as usize,
            snapshot_key: cache.snapshot_key().to_string(),
            debounce_ms: cache.config().debounce_ms,
            ttl_ms: cache.config().ttl().map(|ttl| ttl.as_millis() as u64),
            cache: cache.status(),
            stats: cache.stats(),
        })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
