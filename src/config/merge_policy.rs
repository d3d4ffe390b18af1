//! Merge rules: defaults applied before any file or environment source.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.path", ".soulstore/db")?
        .set_default("storage.init_attempts", 3)?
        .set_default("storage.init_retry_delay_ms", 500)?
        .set_default("cache.debounce_ms", 50)?
        .set_default("cache.ttl_ms", 24 * 60 * 60 * 1000)?
        .set_default("cache.snapshot_key", "persistentCache")
}
