//! Error types for the SoulStore node cache.

use thiserror::Error;

/// Failures reported by an underlying key-value store.
///
/// Cloneable so a single failed fetch can be delivered to every waiter that was
/// coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Invalid stored data: {0}")]
    Data(String),

    #[error("Store closed before the request completed")]
    Closed,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Data(err.to_string())
    }
}

/// Errors surfaced to callers of the cache and the node adapter
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Storage failed to initialize after {attempts} attempts: {message}")]
    Initialization { attempts: u32, message: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed node: {0}")]
    MalformedNode(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
