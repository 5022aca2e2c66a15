//! One-page fetches of remote collections.

use crate::api::{with_timeout, RemoteApi};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::types::{CollectionKey, Page};
use std::sync::Arc;
use std::time::Duration;

/// Fetches single pages. Never touches the cache; the caller decides
/// whether the result is still wanted.
#[derive(Clone)]
pub struct PaginatedCollectionFetcher {
    api: Arc<dyn RemoteApi>,
    page_size: u32,
    timeout: Duration,
}

impl PaginatedCollectionFetcher {
    pub fn new(api: Arc<dyn RemoteApi>, config: &SyncConfig) -> Self {
        Self {
            api,
            page_size: config.page_size,
            timeout: config.request_timeout,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch page `page` (1-based) of `key`.
    ///
    /// A blank search resolves to an empty, exhausted page without a
    /// request. A request outliving the configured timeout fails with a
    /// server error.
    pub async fn fetch_page(&self, key: &CollectionKey, page: u32) -> Result<Page> {
        if page == 0 {
            return Err(SyncError::InvalidOperation("pages are 1-based".into()));
        }
        if key.is_blank_search() {
            return Ok(Page::default());
        }

        with_timeout(self.timeout, self.api.fetch_page(key, page, self.page_size)).await
    }
}
