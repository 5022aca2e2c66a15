//! Mutation request and snapshot types.

use crate::collections::RemovedEntry;
use crate::types::{
    Generation, ItemId, MutationClass, MutationKind, Notification, NotificationId, UserId,
    UserProjection,
};
use std::fmt;

/// What a mutation acts on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MutationTarget {
    Item(ItemId),
    User(UserId),
    Notification(NotificationId),
    AllNotifications,
}

impl MutationTarget {
    /// Interpret a raw id according to the kind of mutation.
    pub fn for_kind(kind: MutationKind, id: impl Into<String>) -> Self {
        match kind {
            MutationKind::Like
            | MutationKind::Unlike
            | MutationKind::Save
            | MutationKind::Unsave
            | MutationKind::Delete => MutationTarget::Item(ItemId(id.into())),
            MutationKind::Follow | MutationKind::Unfollow => MutationTarget::User(UserId(id.into())),
            MutationKind::MarkRead | MutationKind::DeleteNotification => {
                MutationTarget::Notification(NotificationId(id.into()))
            }
            MutationKind::MarkAllRead => MutationTarget::AllNotifications,
        }
    }

    /// The id sent to the server.
    pub fn as_str(&self) -> &str {
        match self {
            MutationTarget::Item(id) => id.as_str(),
            MutationTarget::User(id) => id.as_str(),
            MutationTarget::Notification(id) => id.as_str(),
            MutationTarget::AllNotifications => "",
        }
    }
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::AllNotifications => write!(f, "all-notifications"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// The state needed to undo one optimistic change.
#[derive(Clone, Debug)]
pub enum MutationSnapshot {
    Likes { liked: bool, like_count: i64 },
    Saved { saved: bool },
    Removed(Vec<RemovedEntry>),
    /// `synthesized` when the projection was created for the mutation.
    Follow {
        previous: UserProjection,
        synthesized: bool,
    },
    Read(Vec<NotificationId>),
    RemovedNotification { index: usize, notification: Notification },
}

/// An admitted mutation.
#[derive(Clone, Debug)]
pub struct MutationRequest {
    pub target: MutationTarget,
    pub kind: MutationKind,
    pub previous: MutationSnapshot,
    pub issued_at_generation: Generation,
}

impl MutationRequest {
    pub fn class(&self) -> MutationClass {
        self.kind.class()
    }
}

/// How an admitted mutation resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    Confirmed,
    RolledBack { message: String },
}
