//! Key-Value Store
//!
//! The four-plus primitives the cache consumes from an underlying store, and the
//! bounded-retry startup that opens one. Values are opaque serialized strings;
//! only the cache knows they hold JSON nodes.

pub mod memory;
pub mod persistence;

pub use memory::MemoryKeyValueStore;
pub use persistence::SledKeyValueStore;

use crate::config::StorageConfig;
use crate::error::{ApiError, StoreError};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Asynchronous key-value store interface
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// All keys in lexicographic order
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    async fn length(&self) -> Result<usize, StoreError>;

    /// All `(key, value)` pairs in key order
    async fn entries(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// Visit every entry as `(value, key, index)`.
    async fn for_each(
        &self,
        visitor: &mut (dyn for<'v> FnMut(&'v str, &'v str, usize) + Send),
    ) -> Result<(), StoreError> {
        let entries = self.entries().await?;
        for (index, (key, value)) in entries.iter().enumerate() {
            visitor(value, key, index);
        }
        Ok(())
    }
}

/// Open a store, retrying with a fixed delay until it becomes ready.
///
/// After `config.init_attempts` failures the last error is surfaced as
/// [`ApiError::Initialization`].
pub async fn open_with_retry<S, F, Fut>(config: &StorageConfig, mut opener: F) -> Result<S, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, StoreError>>,
{
    let attempts = config.init_attempts.max(1);
    let delay = Duration::from_millis(config.init_retry_delay_ms);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match opener().await {
            Ok(store) => {
                info!(attempt, "Storage ready");
                return Ok(store);
            }
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "Storage init attempt failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ApiError::Initialization {
        attempts,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string()),
    })
}
