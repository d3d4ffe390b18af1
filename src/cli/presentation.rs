//! CLI presentation: status formatting. No I/O.

use crate::cache::{CacheStats, CacheStatus};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;

/// Everything `soulstore status` reports
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub store_path: String,
    /// Node keys in the store, snapshot key excluded
    pub store_keys: usize,
    pub snapshot_key: String,
    pub debounce_ms: u64,
    /// `None` when entries never expire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    pub cache: CacheStatus,
    pub stats: CacheStats,
}

pub fn format_status_json(report: &StatusReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

pub fn format_status_text(report: &StatusReport) -> String {
    let mut out = String::new();

    out.push_str("Store\n\n");
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec!["Path".to_string(), report.store_path.clone()]);
    table.add_row(vec!["Node keys".to_string(), report.store_keys.to_string()]);
    table.add_row(vec!["Snapshot key".to_string(), report.snapshot_key.clone()]);
    table.add_row(vec!["Debounce".to_string(), format!("{} ms", report.debounce_ms)]);
    table.add_row(vec![
        "TTL".to_string(),
        report
            .ttl_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(|| "never".to_string()),
    ]);
    out.push_str(&format!("{}\n\n", table));

    out.push_str("Cache\n\n");
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    let rows = [
        ("Entries", report.cache.count as u64),
        ("Estimated bytes", report.cache.bytes as u64),
        ("Pending keys", report.cache.pending as u64),
        ("Hits", report.stats.hits),
        ("Misses", report.stats.misses),
        ("Coalesced reads", report.stats.coalesced),
        ("Store fetches", report.stats.fetches),
        ("Fetch failures", report.stats.fetch_failures),
        ("Writes", report.stats.writes),
        ("Snapshot writes", report.stats.snapshot_writes),
        ("Snapshot failures", report.stats.snapshot_failures),
    ];
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value.to_string()]);
    }
    out.push_str(&format!("{}", table));
    out
}
