//! soulstore
//!
//! Storage adapter for a graph-sync engine: nodes written by soul are merged
//! field-by-field with last-writer-wins state vectors, and reads go through a
//! coalescing in-memory cache backed by a slow key-value store.

pub mod adapter;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod store;
pub mod types;

pub use adapter::NodeAdapter;
pub use cache::CoalescingCache;
pub use error::{ApiError, StoreError};
pub use types::Node;
