//! Notice types published to UI subscribers.

use crate::types::{Generation, MutationKind, ViewId};
use serde::{Deserialize, Serialize};

/// Configuration for a notice subscription.
#[derive(Clone, Debug)]
pub struct NoticeConfig {
    /// Max buffered notices before dropping the subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: NoticeFilter,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: NoticeFilter::all(),
        }
    }
}

/// Filter criteria for notice subscriptions.
#[derive(Clone, Debug, Default)]
pub struct NoticeFilter {
    /// Only collection notices for these views (None = all views).
    pub views: Option<Vec<ViewId>>,

    /// Include collection changes and fetch failures.
    pub include_collections: bool,

    /// Include mutation outcomes.
    pub include_mutations: bool,

    /// Include notification-center changes.
    pub include_notifications: bool,

    /// Include session and push-connection lifecycle.
    pub include_lifecycle: bool,
}

impl NoticeFilter {
    /// Collection notices for specific views.
    pub fn views(views: Vec<ViewId>) -> Self {
        Self {
            views: Some(views),
            include_collections: true,
            ..Default::default()
        }
    }

    /// Mutation outcomes only.
    pub fn mutations() -> Self {
        Self {
            include_mutations: true,
            ..Default::default()
        }
    }

    /// Session and push lifecycle only.
    pub fn lifecycle() -> Self {
        Self {
            include_lifecycle: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            views: None,
            include_collections: true,
            include_mutations: true,
            include_notifications: true,
            include_lifecycle: true,
        }
    }

    pub(crate) fn matches(&self, notice: &SyncNotice) -> bool {
        match notice {
            SyncNotice::CollectionChanged { view, .. } | SyncNotice::FetchFailed { view, .. } => {
                self.include_collections
                    && self.views.as_ref().map_or(true, |views| views.contains(view))
            }
            SyncNotice::MutationConfirmed { .. } | SyncNotice::MutationRolledBack { .. } => {
                self.include_mutations
            }
            SyncNotice::NotificationsChanged { .. } => self.include_notifications,
            SyncNotice::SessionExpired
            | SyncNotice::PushConnected
            | SyncNotice::PushDisconnected { .. } => self.include_lifecycle,
            SyncNotice::Dropped { .. } => true,
        }
    }
}

/// Notices published by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncNotice {
    // --- Collection Notices ---
    /// Items, phase or flags of a view changed.
    CollectionChanged {
        view: ViewId,
        generation: Generation,
    },

    /// A page fetch failed. On the first page the view is empty.
    FetchFailed {
        view: ViewId,
        generation: Generation,
        first_page: bool,
        message: String,
    },

    // --- Mutation Notices ---
    MutationConfirmed {
        target: String,
        kind: MutationKind,
    },

    /// The optimistic change was reverted. Transient error notice.
    MutationRolledBack {
        target: String,
        kind: MutationKind,
        message: String,
    },

    // --- Notification Center ---
    NotificationsChanged {
        unread_count: usize,
    },

    // --- Lifecycle ---
    /// The session is invalid; the stored token was cleared.
    SessionExpired,

    PushConnected,

    PushDisconnected {
        reason: String,
    },

    /// The subscription was dropped.
    Dropped {
        reason: DropReason,
    },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a notice subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoticeId(pub u64);

/// Handle to a notice subscription.
pub struct NoticeHandle {
    pub id: NoticeId,
    /// Channel to receive notices.
    pub receiver: crossbeam_channel::Receiver<SyncNotice>,
}

impl NoticeHandle {
    /// Receive the next notice (blocking).
    pub fn recv(&self) -> Result<SyncNotice, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notice (non-blocking).
    pub fn try_recv(&self) -> Result<SyncNotice, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncNotice, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<SyncNotice> {
        self.receiver.try_iter().collect()
    }
}
