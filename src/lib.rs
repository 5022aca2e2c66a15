//! # Photo Sync
//!
//! The client-side synchronization core of a photo-sharing app: paginated,
//! optimistically mutated collections kept consistent with a remote
//! service while requests complete in any order.
//!
//! ## Core Concepts
//!
//! - **Views**: Each on-screen collection slot holds one `CollectionKey`
//!   and a generation; results issued under an older generation are dropped
//! - **Sequencing**: Page fetches are tagged with the generation they were
//!   issued under and applied only if it is still current
//! - **Optimistic Mutations**: Likes, saves, follows, deletes and read
//!   flags change the cache at once and are confirmed or rolled back later
//! - **Push**: One authenticated channel per session feeds the
//!   notifications collection
//! - **Notices**: UIs subscribe to change notices instead of polling
//!
//! ## Example
//!
//! ```ignore
//! use photo_sync::{CollectionKey, Credentials, MutationKind, SyncConfig, SyncEngine, UserId, ViewId};
//!
//! let engine = SyncEngine::sign_in(SyncConfig::from_env(), Credentials {
//!     token: token.into(),
//!     user_id: UserId::new("u1"),
//! })?;
//!
//! // Show the home feed and load its first page
//! let home = ViewId::new("home");
//! engine.open_collection(&home, CollectionKey::feed());
//!
//! // Like a photo; the count changes before the server answers
//! engine.mutate("p1", MutationKind::Like);
//!
//! // Notifications arrive over the push channel
//! engine.connect_push().await;
//! ```

pub mod api;
pub mod collections;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod mutations;
pub mod notices;
pub mod notifications;
pub mod realtime;
pub mod sequencer;
pub mod session;
pub mod types;
pub mod viewport;

// Re-exports
pub use api::{HttpApi, RemoteApi};
pub use collections::{CollectionState, CollectionStore, LoadTicket, RemovedEntry};
pub use config::{SyncConfig, DEFAULT_PAGE_SIZE};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use fetcher::PaginatedCollectionFetcher;
pub use mutations::{
    MutationOutcome, MutationRequest, MutationSnapshot, MutationTarget,
    OptimisticMutationCoordinator,
};
pub use notices::{
    DropReason, NoticeConfig, NoticeFilter, NoticeHandle, NoticeId, NoticeManager, SyncNotice,
};
pub use notifications::NotificationCenter;
pub use realtime::{
    ClientMessage, EventKind, HandlerId, PushConnection, PushEvent, PushTransport,
    RealtimeEventBus, WebSocketTransport,
};
pub use sequencer::{RequestSequencer, SequenceOutcome};
pub use session::{AuthGate, Credentials, NotificationPreferences, Session, SessionStore};
pub use types::*;
pub use viewport::ViewportLoadTrigger;
