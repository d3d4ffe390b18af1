//! Configuration System
//!
//! Layered configuration for storage, cache and logging. Defaults, then the
//! global config file, then workspace files, then `SOULSTORE__*` environment
//! variables; later layers win.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge_policy;
mod sources;

pub use sources::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoulStoreConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Underlying store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory; relative paths resolve against the workspace root
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Attempts to open the store before giving up
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,

    /// Fixed delay between open attempts (milliseconds)
    #[serde(default = "default_init_retry_delay_ms")]
    pub init_retry_delay_ms: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".soulstore/db")
}

fn default_init_attempts() -> u32 {
    3
}

fn default_init_retry_delay_ms() -> u64 {
    500
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            init_attempts: default_init_attempts(),
            init_retry_delay_ms: default_init_retry_delay_ms(),
        }
    }
}

impl StorageConfig {
    /// Store path, resolved against `workspace_root` when relative.
    pub fn resolve_path(&self, workspace_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace_root.join(&self.path)
        }
    }
}

/// Coalescing cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Debounce window for coalescing reads of one key (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Entry lifetime (milliseconds); 0 disables expiry
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Reserved store key holding the cache snapshot
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,

    /// Keys read into the cache right after startup
    #[serde(default)]
    pub preload_keys: Vec<String>,
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000 // 24 hours
}

fn default_snapshot_key() -> String {
    "persistentCache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ttl_ms: default_ttl_ms(),
            snapshot_key: default_snapshot_key(),
            preload_keys: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn ttl(&self) -> Option<Duration> {
        if self.ttl_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ttl_ms))
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Storage(String),
    Cache(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SoulStoreConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }
        if self.storage.init_attempts == 0 {
            errors.push(ValidationError::Storage(
                "init_attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.snapshot_key.is_empty() {
            errors.push(ValidationError::Cache(
                "snapshot_key cannot be empty".to_string(),
            ));
        }
        if self
            .cache
            .preload_keys
            .iter()
            .any(|k| k == &self.cache.snapshot_key)
        {
            errors.push(ValidationError::Cache(
                "preload_keys must not contain the snapshot key".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`SoulStoreConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace
    pub fn load(workspace_root: &Path) -> Result<SoulStoreConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = sources::add_global_file(builder)?;
        let builder = sources::add_workspace_files(builder, workspace_root)?;
        let builder = sources::add_environment(builder);
        Self::finish(builder.build()?)
    }

    /// Load configuration from a single explicit file (plus environment overrides)
    pub fn load_from_file(path: &Path) -> Result<SoulStoreConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true));
        let builder = sources::add_environment(builder);
        Self::finish(builder.build()?)
    }

    fn finish(raw: config::Config) -> Result<SoulStoreConfig, ApiError> {
        let config: SoulStoreConfig = raw.try_deserialize()?;
        config.validate().map_err(|errors| {
            ApiError::ConfigError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        Ok(config)
    }
}
