//! Core types for the synchronization core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque photo (or list entry) identifier, stable across pages.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote user identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        NotificationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The slot a collection is displayed in ("home", "search", "saved", ...).
///
/// A view holds exactly one current [`CollectionKey`]; changing it resets
/// the view's state under a new generation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        ViewId(id.into())
    }
}

impl fmt::Debug for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewId({})", self.0)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic token bumped on every key change or reset of a view.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen({})", self.0)
    }
}

/// Which remote collection a key points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionSource {
    /// Photo feed, optionally filtered by location.
    Feed { location: Option<String> },
    /// Photo search; the query lives in [`CollectionKey::query`].
    Search,
    /// The signed-in user's saved photos.
    Saved,
    /// Users following the given user.
    Followers { user: UserId },
    /// Users the given user follows.
    Following { user: UserId },
}

/// Identifier of a logical collection instance.
///
/// Changing any component invalidates the page state of the view it is
/// displayed in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    pub source: CollectionSource,
    pub query: Option<String>,
}

impl CollectionKey {
    pub fn feed() -> Self {
        Self {
            source: CollectionSource::Feed { location: None },
            query: None,
        }
    }

    pub fn feed_at(location: impl Into<String>) -> Self {
        Self {
            source: CollectionSource::Feed {
                location: Some(location.into()),
            },
            query: None,
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self {
            source: CollectionSource::Search,
            query: Some(query.into()),
        }
    }

    pub fn saved() -> Self {
        Self {
            source: CollectionSource::Saved,
            query: None,
        }
    }

    pub fn followers(user: UserId) -> Self {
        Self {
            source: CollectionSource::Followers { user },
            query: None,
        }
    }

    pub fn following(user: UserId) -> Self {
        Self {
            source: CollectionSource::Following { user },
            query: None,
        }
    }

    /// A search key whose query is blank never hits the network.
    pub fn is_blank_search(&self) -> bool {
        matches!(self.source, CollectionSource::Search)
            && self.query.as_deref().map_or(true, |q| q.trim().is_empty())
    }
}

/// Loading phase of a collection view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    LoadingInitial,
    LoadingMore,
    Error,
}

impl Phase {
    pub fn is_loading(self) -> bool {
        matches!(self, Phase::LoadingInitial | Phase::LoadingMore)
    }
}

/// User-triggered mutation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Unlike,
    Save,
    Unsave,
    Delete,
    Follow,
    Unfollow,
    MarkRead,
    MarkAllRead,
    DeleteNotification,
}

/// Mutations that conflict with each other share a class; at most one
/// mutation per (target, class) may be in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationClass {
    LikeToggle,
    SaveToggle,
    Removal,
    FollowToggle,
    ReadState,
}

impl MutationKind {
    pub fn class(self) -> MutationClass {
        match self {
            MutationKind::Like | MutationKind::Unlike => MutationClass::LikeToggle,
            MutationKind::Save | MutationKind::Unsave => MutationClass::SaveToggle,
            MutationKind::Delete | MutationKind::DeleteNotification => MutationClass::Removal,
            MutationKind::Follow | MutationKind::Unfollow => MutationClass::FollowToggle,
            MutationKind::MarkRead | MutationKind::MarkAllRead => MutationClass::ReadState,
        }
    }

    /// True if the two kinds are equivalent or conflicting.
    pub fn conflicts_with(self, other: MutationKind) -> bool {
        self.class() == other.class()
    }
}

/// Like/save state of an item plus its in-flight mutations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionState {
    pub liked: bool,
    pub like_count: i64,
    pub saved: bool,
    /// Kinds with a confirming call in flight. Never sent by the server.
    #[serde(skip)]
    pub pending: BTreeSet<MutationKind>,
}

impl InteractionState {
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// True if a pending kind conflicts with `kind`.
    pub fn is_pending(&self, kind: MutationKind) -> bool {
        self.pending.iter().any(|p| p.conflicts_with(kind))
    }
}

/// A collection entry: an opaque payload plus interaction state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Domain payload (title, url, owner, ...). Opaque to the core.
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub interaction: InteractionState,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(id),
            payload: serde_json::Map::new(),
            interaction: InteractionState::default(),
        }
    }

    pub fn with_likes(mut self, liked: bool, like_count: i64) -> Self {
        self.interaction.liked = liked;
        self.interaction.like_count = like_count;
        self
    }

    pub fn with_saved(mut self, saved: bool) -> Self {
        self.interaction.saved = saved;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(name.into(), value);
        self
    }
}

/// One fetched page of a remote collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub has_more: bool,
}

/// A push- or fetch-delivered notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub read: bool,
    /// Server timestamp, kept as delivered.
    pub created_at: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn new(id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(id),
            read: false,
            created_at: created_at.into(),
            payload: serde_json::Map::new(),
        }
    }
}

/// Follow state of a user as seen by the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProjection {
    pub user_id: UserId,
    pub following: bool,
    pub follower_count: i64,
    pub pending: BTreeSet<MutationKind>,
}

impl UserProjection {
    pub fn new(user_id: UserId, following: bool, follower_count: i64) -> Self {
        Self {
            user_id,
            following,
            follower_count,
            pending: BTreeSet::new(),
        }
    }
}

/// Authoritative values returned by a confirmed mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationAck {
    pub liked: Option<bool>,
    pub like_count: Option<i64>,
    pub saved: Option<bool>,
    pub following: Option<bool>,
    pub follower_count: Option<i64>,
}

/// The part of a view's state the viewport trigger gates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadStatus {
    pub phase: Phase,
    pub has_more: bool,
}

impl LoadStatus {
    pub fn can_load_more(&self) -> bool {
        self.has_more && !self.phase.is_loading()
    }
}
