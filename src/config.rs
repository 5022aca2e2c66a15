//! Sync engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of items per page for every collection type.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Base URL of the REST API (without the `/api` prefix).
    pub base_url: String,

    /// URL of the push channel.
    pub push_url: String,

    /// Items requested per page.
    /// Default: 12
    pub page_size: u32,

    /// Upper bound on any single request. A hung request resolves to a
    /// server error after this long.
    /// Default: 15s
    pub request_timeout: Duration,

    /// Quiet period after a search query changes before its first page is
    /// requested.
    /// Default: 300ms
    pub search_debounce: Duration,

    /// Max buffered notices per subscriber before it is dropped.
    /// Default: 256
    pub notice_buffer_size: usize,

    /// Directory holding the persisted session and notification preferences.
    pub data_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            push_url: "ws://localhost:5000/ws".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(15),
            search_debounce: Duration::from_millis(300),
            notice_buffer_size: 256,
            data_dir: PathBuf::from("./photo-sync"),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `PHOTO_SYNC_*` environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PHOTO_SYNC_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("PHOTO_SYNC_PUSH_URL") {
            config.push_url = url;
        }
        if let Some(raw) = lookup("PHOTO_SYNC_PAGE_SIZE") {
            match raw.parse::<u32>() {
                Ok(size) if size > 0 => config.page_size = size,
                _ => tracing::warn!(value = %raw, "ignoring invalid PHOTO_SYNC_PAGE_SIZE"),
            }
        }
        if let Some(raw) = lookup("PHOTO_SYNC_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config.request_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid PHOTO_SYNC_TIMEOUT_SECS"),
            }
        }
        if let Some(raw) = lookup("PHOTO_SYNC_SEARCH_DEBOUNCE_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.search_debounce = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid PHOTO_SYNC_SEARCH_DEBOUNCE_MS"),
            }
        }
        if let Some(dir) = lookup("PHOTO_SYNC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }
}
