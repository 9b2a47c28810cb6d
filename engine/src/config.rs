//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Time windows and page sizes used by the synchronizer.
///
/// All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Lifetime of a pending action list after its last enqueue
    pub action_queue_ttl: u64,
    /// How long a correlation token maps to its temp id, and how long a
    /// processed token suppresses duplicate pushes
    pub token_ttl: u64,
    /// How long a reconciled temp id still resolves to its real id
    pub id_mapping_ttl: u64,
    /// Freshness window of cached pages
    pub page_cache_ttl: u64,
    /// Delay before a like change re-sorts a visible list
    pub resort_debounce: u64,
    /// Top-level comments per page
    pub page_size: usize,
    /// Replies fetched per page
    pub replies_page_size: usize,
    /// Longest accepted comment
    pub max_content_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            action_queue_ttl: 2 * 60 * 1000,
            token_ttl: 5_000,
            id_mapping_ttl: 5_000,
            page_cache_ttl: 30_000,
            resort_debounce: 2_000,
            page_size: 10,
            replies_page_size: 5,
            max_content_len: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"pageSize": 20}"#).unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.action_queue_ttl, 120_000);
        assert_eq!(config.max_content_len, 500);
    }
}
