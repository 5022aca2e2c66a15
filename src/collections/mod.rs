//! Per-view collection caches.
//!
//! Every collection a UI shows (home feed, search results, saved photos,
//! follower lists) lives in a [`CollectionStore`] under a [`ViewId`].
//! A view's [`CollectionState`] is tagged with a generation; a completion
//! carrying an older generation is rejected as stale.
//!
//! [`ViewId`]: crate::types::ViewId

mod state;
mod store;

pub use state::CollectionState;
pub use store::{CollectionStore, LoadTicket, RemovedEntry};
