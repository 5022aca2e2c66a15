//! Remote service boundary.
//!
//! [`RemoteApi`] is the seam every component talks to; [`HttpApi`] is the
//! REST implementation. Tests substitute scripted implementations.

mod endpoints;
mod http;
pub mod wire;

pub use endpoints::{Endpoint, Method};
pub use http::HttpApi;

use crate::error::{Result, SyncError};
use crate::types::{CollectionKey, MutationAck, MutationKind, Notification, Page, UserId, UserProjection};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Calls the synchronization core makes against the remote service.
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    /// Fetch one page (1-based) of a collection.
    async fn fetch_page(&self, key: &CollectionKey, page: u32, limit: u32) -> Result<Page>;

    /// Issue the confirming call for a mutation. `target` is the photo,
    /// user or notification id (ignored for `MarkAllRead`).
    async fn apply_mutation(&self, kind: MutationKind, target: &str) -> Result<MutationAck>;

    /// The signed-in user's notifications, newest first.
    async fn fetch_notifications(&self) -> Result<Vec<Notification>>;

    /// Whether the signed-in user follows `user`, plus their follower count.
    async fn fetch_follow_status(&self, user: &UserId) -> Result<UserProjection>;
}

/// Bound `call` by `timeout`. A call that outlives it fails with a server
/// error.
pub(crate) async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, "request timed out");
            Err(SyncError::server("request timed out"))
        }
    }
}
