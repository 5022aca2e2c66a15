//! Notice fan-out for UI subscribers.
//!
//! The engine publishes a [`SyncNotice`] whenever something a UI would
//! render changes:
//! - A collection view was reset, extended or mutated
//! - A fetch or a mutation failed (transient error notice)
//! - The session expired (signal for the sign-in flow)
//! - The push channel connected or dropped
//!
//! Subscribers get a bounded buffer; a subscriber that stops draining it
//! is dropped rather than blocking the engine.
//!
//! # Example
//!
//! ```ignore
//! let handle = engine.notices().subscribe(NoticeConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SyncNotice::CollectionChanged { view, .. }) => redraw(&view),
//!         Ok(SyncNotice::SessionExpired) => go_to_sign_in(),
//!         Ok(SyncNotice::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::NoticeManager;
pub use types::{DropReason, NoticeConfig, NoticeFilter, NoticeHandle, NoticeId, SyncNotice};
