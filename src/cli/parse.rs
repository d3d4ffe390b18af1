//! CLI parse: clap types for soulstore. No behavior; definitions only.

use crate::adapter::DEFAULT_PAGE_LIMIT;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// soulstore CLI - merge-on-write node storage with a coalescing cache
#[derive(Parser)]
#[command(name = "soulstore")]
#[command(about = "Inspect and edit a soulstore node database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read a merged node by soul
    Get {
        /// Node soul
        key: String,
        /// Project a single field
        #[arg(long)]
        field: Option<String>,
    },
    /// Merge-write a node (JSON). Nodes without `_.#` are keyed by top-level soul.
    Put {
        /// Node payload as JSON
        node: String,
        /// Wrap the payload under this soul
        #[arg(long)]
        soul: Option<String>,
    },
    /// Remove a raw store key
    Remove {
        /// Store key
        key: String,
    },
    /// List stored keys
    Keys {
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Read a window of nodes whose souls share a prefix
    Paginate {
        /// Soul prefix
        prefix: String,
        /// Keys to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Maximum nodes to return
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
    /// Show cache and store status
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Drop the in-memory cache and its persisted snapshot
    ClearCache,
}
