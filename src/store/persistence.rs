//! Persistence layer for the key-value store

use crate::error::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Sled-based implementation of KeyValueStore
///
/// Keys and values are stored as UTF-8 bytes. Sled iterates keys in byte order,
/// which for UTF-8 is the same as lexicographic string order.
pub struct SledKeyValueStore {
    db: sled::Db,
}

impl SledKeyValueStore {
    /// Open (or create) a sled database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Io(format!("Failed to open sled database: {}", e)))?;
        Ok(Self { db })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Io(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

fn decode(bytes: &[u8], what: &str) -> Result<String, StoreError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StoreError::Data(format!("Non UTF-8 {} in store: {}", what, e)))
}

#[async_trait]
impl KeyValueStore for SledKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to get {}: {}", key, e)))?
        {
            Some(value) => Ok(Some(decode(&value, "value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to set {}: {}", key, e)))?;
        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to remove {}: {}", key, e)))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.db
            .clear()
            .map_err(|e| StoreError::Io(format!("Failed to clear database: {}", e)))?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for key in self.db.iter().keys() {
            let key = key.map_err(|e| StoreError::Io(format!("Failed to iterate store: {}", e)))?;
            keys.push(decode(&key, "key")?);
        }
        Ok(keys)
    }

    async fn length(&self) -> Result<usize, StoreError> {
        Ok(self.db.len())
    }

    async fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut entries = Vec::new();
        for item in self.db.iter() {
            let (key, value) =
                item.map_err(|e| StoreError::Io(format!("Failed to iterate store: {}", e)))?;
            entries.push((decode(&key, "key")?, decode(&value, "value")?));
        }
        Ok(entries)
    }
}
