//! The in-memory cache of every collection view.

use super::state::CollectionState;
use crate::error::{Result, SyncError};
use crate::types::{
    CollectionKey, Generation, InteractionState, Item, ItemId, LoadStatus, Page, Phase, UserId,
    UserProjection, ViewId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A page load admitted by [`CollectionStore::begin_load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    pub view: ViewId,
    pub key: CollectionKey,
    pub generation: Generation,
    pub page: u32,
}

/// An item taken out of a view by an optimistic delete.
#[derive(Clone, Debug)]
pub struct RemovedEntry {
    pub view: ViewId,
    pub generation: Generation,
    pub index: usize,
    pub item: Item,
}

#[derive(Default)]
struct StoreInner {
    views: HashMap<ViewId, CollectionState>,
    users: HashMap<UserId, UserProjection>,
    /// Optimistic interaction state of items with a mutation in flight.
    pending: HashMap<ItemId, InteractionState>,
    /// Items with a delete in flight, with their latest interaction state.
    removing: HashMap<ItemId, InteractionState>,
    last_generation: Generation,
}

impl StoreInner {
    fn bump(&mut self) -> Generation {
        self.last_generation = self.last_generation.next();
        self.last_generation
    }

    /// Latest interaction state, including items taken out by a delete.
    fn current_interaction(&self, id: &ItemId) -> Option<InteractionState> {
        if let Some(state) = self.pending.get(id).or_else(|| self.removing.get(id)) {
            return Some(state.clone());
        }
        self.views
            .values()
            .find_map(|view| view.get(id))
            .map(|item| item.interaction.clone())
    }

    fn write_interaction(&mut self, id: &ItemId, interaction: &InteractionState) -> Vec<ViewId> {
        let mut touched = Vec::new();
        for (view_id, view) in self.views.iter_mut() {
            if let Some(item) = view.get_mut(id) {
                item.interaction = interaction.clone();
                touched.push(view_id.clone());
            }
        }
        touched
    }
}

/// Owner of every [`CollectionState`], keyed by view.
///
/// All methods take the lock for their whole duration and never across an
/// await point, so each call is atomic with respect to other tasks.
#[derive(Clone, Default)]
pub struct CollectionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- View Lifecycle ---

    /// Show `key` in `view`. A different key (or a first open) starts a new
    /// generation; the same key keeps the current one.
    ///
    /// Returns the view's generation and whether it was reset.
    pub fn open(&self, view: &ViewId, key: CollectionKey) -> (Generation, bool) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.views.get(view) {
            if state.key == key {
                return (state.generation, false);
            }
        }
        let generation = inner.bump();
        tracing::debug!(%view, ?generation, ?key, "collection view reset");
        inner
            .views
            .insert(view.clone(), CollectionState::new(key, generation));
        (generation, true)
    }

    /// Start the view over with the same key under a new generation.
    pub fn reset(&self, view: &ViewId) -> Result<Generation> {
        let mut inner = self.inner.lock();
        let key = inner
            .views
            .get(view)
            .map(|state| state.key.clone())
            .ok_or_else(|| SyncError::InvalidOperation(format!("unknown view {}", view)))?;
        let generation = inner.bump();
        inner
            .views
            .insert(view.clone(), CollectionState::new(key, generation));
        Ok(generation)
    }

    pub fn close(&self, view: &ViewId) -> bool {
        self.inner.lock().views.remove(view).is_some()
    }

    /// Drop every view, user projection and pending overlay.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.views.clear();
        inner.users.clear();
        inner.pending.clear();
        inner.removing.clear();
    }

    // --- Reads ---

    pub fn snapshot(&self, view: &ViewId) -> Option<CollectionState> {
        self.inner.lock().views.get(view).cloned()
    }

    pub fn items(&self, view: &ViewId) -> Vec<Item> {
        self.inner
            .lock()
            .views
            .get(view)
            .map(|state| state.items.clone())
            .unwrap_or_default()
    }

    /// The most recently issued generation across all views.
    pub fn latest_generation(&self) -> Generation {
        self.inner.lock().last_generation
    }

    pub fn generation(&self, view: &ViewId) -> Option<Generation> {
        self.inner.lock().views.get(view).map(|state| state.generation)
    }

    pub fn load_status(&self, view: &ViewId) -> Option<LoadStatus> {
        self.inner.lock().views.get(view).map(|state| state.load_status())
    }

    pub fn sentinel(&self, view: &ViewId) -> Option<ItemId> {
        self.inner
            .lock()
            .views
            .get(view)
            .and_then(|state| state.sentinel().cloned())
    }

    /// First copy of an item found in any view.
    pub fn find_item(&self, id: &ItemId) -> Option<Item> {
        self.inner
            .lock()
            .views
            .values()
            .find_map(|state| state.get(id).cloned())
    }

    /// Views currently holding the item.
    pub fn views_holding(&self, id: &ItemId) -> Vec<ViewId> {
        self.inner
            .lock()
            .views
            .iter()
            .filter(|(_, state)| state.get(id).is_some())
            .map(|(view, _)| view.clone())
            .collect()
    }

    // --- Page Loading ---

    /// Admit a page load unless one is already running for this view or
    /// the collection is exhausted.
    pub fn begin_load(&self, view: &ViewId) -> Option<LoadTicket> {
        let mut inner = self.inner.lock();
        let state = inner.views.get_mut(view)?;
        if !state.load_status().can_load_more() {
            return None;
        }
        state.phase = if state.cursor <= 1 {
            Phase::LoadingInitial
        } else {
            Phase::LoadingMore
        };
        Some(LoadTicket {
            view: view.clone(),
            key: state.key.clone(),
            generation: state.generation,
            page: state.cursor,
        })
    }

    /// Apply a fetched page if `generation` is still current.
    ///
    /// Returns the number of appended items, or [`SyncError::Stale`].
    pub fn apply_page(&self, ticket: &LoadTicket, page: Page) -> Result<usize> {
        let mut inner = self.inner.lock();
        let StoreInner {
            views,
            pending,
            removing,
            ..
        } = &mut *inner;
        let state = views
            .get_mut(&ticket.view)
            .filter(|state| state.generation == ticket.generation)
            .ok_or(SyncError::Stale)?;
        Ok(state.merge_page(ticket.page, page, pending, removing))
    }

    /// Record a fetch failure if `generation` is still current.
    pub fn apply_failure(&self, ticket: &LoadTicket, message: String) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = inner
            .views
            .get_mut(&ticket.view)
            .filter(|state| state.generation == ticket.generation)
            .ok_or(SyncError::Stale)?;
        state.record_failure(ticket.page, message);
        Ok(())
    }

    /// Return a view to Idle after its load was abandoned (auth failure).
    pub fn abandon_load(&self, ticket: &LoadTicket) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner
            .views
            .get_mut(&ticket.view)
            .filter(|state| state.generation == ticket.generation)
        {
            if state.phase.is_loading() {
                state.phase = Phase::Idle;
            }
        }
    }

    // --- Optimistic Item Mutations ---

    /// Current interaction state of an item (optimistic if pending).
    ///
    /// None for items that are not cached or are being deleted.
    pub fn interaction(&self, id: &ItemId) -> Option<InteractionState> {
        let inner = self.inner.lock();
        if inner.removing.contains_key(id) {
            return None;
        }
        inner.current_interaction(id)
    }

    /// Apply `transition` to the item everywhere it is held and pin the
    /// result as the item's optimistic state until [`settle_item`] is called.
    ///
    /// Returns the state before the transition, or None if no view holds
    /// the item.
    ///
    /// [`settle_item`]: CollectionStore::settle_item
    pub fn begin_item_mutation<F>(&self, id: &ItemId, transition: F) -> Option<InteractionState>
    where
        F: FnOnce(&mut InteractionState),
    {
        let mut inner = self.inner.lock();
        if inner.removing.contains_key(id) {
            return None;
        }
        let previous = inner.current_interaction(id)?;
        let mut next = previous.clone();
        transition(&mut next);
        inner.write_interaction(id, &next);
        inner.pending.insert(id.clone(), next);
        Some(previous)
    }

    /// Apply the outcome of a confirmed or failed mutation. The overlay is
    /// released once nothing is pending on the item.
    pub fn settle_item<F>(&self, id: &ItemId, resolve: F) -> Vec<ViewId>
    where
        F: FnOnce(&mut InteractionState),
    {
        let mut inner = self.inner.lock();
        let Some(mut state) = inner.current_interaction(id) else {
            return Vec::new();
        };
        resolve(&mut state);
        let touched = inner.write_interaction(id, &state);
        // Resolved while a delete holds the item out of every view
        if let Some(removed) = inner.removing.get_mut(id) {
            *removed = state.clone();
        }
        if state.has_pending() {
            inner.pending.insert(id.clone(), state);
        } else {
            inner.pending.remove(id);
        }
        touched
    }

    /// Remove an item from every view, remembering where it was.
    pub fn remove_item(&self, id: &ItemId) -> Vec<RemovedEntry> {
        let mut inner = self.inner.lock();
        let Some(interaction) = inner.current_interaction(id) else {
            return Vec::new();
        };
        inner.removing.insert(id.clone(), interaction);
        let mut removed = Vec::new();
        for (view, state) in inner.views.iter_mut() {
            if let Some(index) = state.position(id) {
                let item = state.items.remove(index);
                removed.push(RemovedEntry {
                    view: view.clone(),
                    generation: state.generation,
                    index,
                    item,
                });
            }
        }
        removed
    }

    /// The delete settled; stop filtering the id out of fetched pages.
    pub fn finish_removal(&self, id: &ItemId) {
        self.inner.lock().removing.remove(id);
    }

    /// Put removed items back at their original index. Views that moved to
    /// a newer generation since the removal are left alone.
    pub fn restore_removed(&self, id: &ItemId, entries: Vec<RemovedEntry>) -> Vec<ViewId> {
        let mut inner = self.inner.lock();
        let latest = inner.removing.remove(id);
        let overlay = inner.pending.get(id).cloned().or(latest);
        let mut touched = Vec::new();
        for entry in entries {
            let Some(state) = inner
                .views
                .get_mut(&entry.view)
                .filter(|state| state.generation == entry.generation)
            else {
                continue;
            };
            let mut item = entry.item;
            if let Some(overlay) = &overlay {
                item.interaction = overlay.clone();
            }
            if state.restore_at(entry.index, item) {
                touched.push(entry.view);
            }
        }
        touched
    }

    // --- User Projections ---

    pub fn user(&self, id: &UserId) -> Option<UserProjection> {
        self.inner.lock().users.get(id).cloned()
    }

    /// Store a fetched follow status. Pending follow toggles keep their
    /// optimistic values.
    pub fn put_user(&self, projection: UserProjection) {
        let mut inner = self.inner.lock();
        let existing = inner
            .users
            .entry(projection.user_id.clone())
            .or_insert_with(|| projection.clone());
        if existing.pending.is_empty() {
            existing.following = projection.following;
            existing.follower_count = projection.follower_count;
        }
    }

    /// Forget a user projection.
    pub fn remove_user(&self, id: &UserId) -> Option<UserProjection> {
        self.inner.lock().users.remove(id)
    }

    /// Mutate a user projection in place. Returns the state before the
    /// change, or None if the user is unknown.
    pub fn update_user<F>(&self, id: &UserId, update: F) -> Option<UserProjection>
    where
        F: FnOnce(&mut UserProjection),
    {
        let mut inner = self.inner.lock();
        let user = inner.users.get_mut(id)?;
        let previous = user.clone();
        update(user);
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MutationKind;

    fn view(name: &str) -> ViewId {
        ViewId::new(name)
    }

    fn page(ids: &[&str], has_more: bool) -> Page {
        Page {
            items: ids.iter().map(|id| Item::new(*id).with_likes(false, 2)).collect(),
            has_more,
        }
    }

    #[test]
    fn test_open_same_key_keeps_generation() {
        let store = CollectionStore::new();
        let (g1, reset) = store.open(&view("home"), CollectionKey::feed());
        assert!(reset);
        let (g2, reset) = store.open(&view("home"), CollectionKey::feed());
        assert!(!reset);
        assert_eq!(g1, g2);

        let (g3, reset) = store.open(&view("home"), CollectionKey::feed_at("Oslo"));
        assert!(reset);
        assert!(g3 > g1);
    }

    #[test]
    fn test_begin_load_gates_concurrent_loads() {
        let store = CollectionStore::new();
        store.open(&view("home"), CollectionKey::feed());

        let ticket = store.begin_load(&view("home")).unwrap();
        assert_eq!(ticket.page, 1);
        assert_eq!(store.load_status(&view("home")).unwrap().phase, Phase::LoadingInitial);
        assert!(store.begin_load(&view("home")).is_none());

        store.apply_page(&ticket, page(&["a"], true)).unwrap();
        let ticket = store.begin_load(&view("home")).unwrap();
        assert_eq!(ticket.page, 2);
        assert_eq!(store.load_status(&view("home")).unwrap().phase, Phase::LoadingMore);
    }

    #[test]
    fn test_stale_page_is_rejected() {
        let store = CollectionStore::new();
        store.open(&view("search"), CollectionKey::search("ca"));
        let old = store.begin_load(&view("search")).unwrap();

        store.open(&view("search"), CollectionKey::search("cat"));
        let result = store.apply_page(&old, page(&["stale"], true));
        assert!(matches!(result, Err(SyncError::Stale)));
        assert!(store.items(&view("search")).is_empty());

        let result = store.apply_failure(&old, "late".into());
        assert!(matches!(result, Err(SyncError::Stale)));
        assert_eq!(store.load_status(&view("search")).unwrap().phase, Phase::Idle);
    }

    #[test]
    fn test_item_mutation_spans_views() {
        let store = CollectionStore::new();
        for name in ["home", "saved"] {
            store.open(&view(name), CollectionKey::feed_at(name));
            let ticket = store.begin_load(&view(name)).unwrap();
            store.apply_page(&ticket, page(&["p1"], false)).unwrap();
        }

        let previous = store
            .begin_item_mutation(&ItemId::new("p1"), |state| {
                state.liked = true;
                state.like_count += 1;
                state.pending.insert(MutationKind::Like);
            })
            .unwrap();
        assert!(!previous.liked);

        for name in ["home", "saved"] {
            let item = &store.items(&view(name))[0];
            assert!(item.interaction.liked);
            assert_eq!(item.interaction.like_count, 3);
        }

        let touched = store.settle_item(&ItemId::new("p1"), |state| {
            state.pending.remove(&MutationKind::Like);
        });
        assert_eq!(touched.len(), 2);
        assert!(!store.interaction(&ItemId::new("p1")).unwrap().has_pending());
    }

    #[test]
    fn test_remove_and_restore_at_index() {
        let store = CollectionStore::new();
        store.open(&view("home"), CollectionKey::feed());
        let ticket = store.begin_load(&view("home")).unwrap();
        store
            .apply_page(&ticket, page(&["a", "b", "c", "d"], false))
            .unwrap();

        let removed = store.remove_item(&ItemId::new("c"));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].index, 2);
        assert_eq!(store.items(&view("home")).len(), 3);

        store.restore_removed(&ItemId::new("c"), removed);
        let ids: Vec<_> = store.items(&view("home")).into_iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_settle_during_removal_carries_into_restore() {
        let store = CollectionStore::new();
        store.open(&view("home"), CollectionKey::feed());
        let ticket = store.begin_load(&view("home")).unwrap();
        store.apply_page(&ticket, page(&["a", "b"], false)).unwrap();
        let a = ItemId::new("a");

        store.begin_item_mutation(&a, |state| {
            state.liked = true;
            state.like_count += 1;
            state.pending.insert(MutationKind::Like);
        });
        let removed = store.remove_item(&a);
        assert!(store.interaction(&a).is_none());
        assert!(store.begin_item_mutation(&a, |state| state.saved = true).is_none());

        // Like rolled back while the item is out of every view
        store.settle_item(&a, |state| {
            state.pending.remove(&MutationKind::Like);
            state.liked = false;
            state.like_count = 2;
        });

        store.restore_removed(&a, removed);
        let restored = store.interaction(&a).unwrap();
        assert_eq!((restored.liked, restored.like_count), (false, 2));
        assert!(!restored.has_pending());
    }

    #[test]
    fn test_remove_user_drops_projection() {
        let store = CollectionStore::new();
        let user = UserId::new("u1");
        store.put_user(UserProjection::new(user.clone(), true, 3));
        assert_eq!(store.remove_user(&user).map(|u| u.follower_count), Some(3));
        assert!(store.user(&user).is_none());
    }

    #[test]
    fn test_put_user_respects_pending_follow() {
        let store = CollectionStore::new();
        let user = UserId::new("u1");
        store.put_user(UserProjection::new(user.clone(), false, 10));

        store.update_user(&user, |u| {
            u.following = true;
            u.follower_count += 1;
            u.pending.insert(MutationKind::Follow);
        });
        store.put_user(UserProjection::new(user.clone(), false, 10));

        let projection = store.user(&user).unwrap();
        assert!(projection.following);
        assert_eq!(projection.follower_count, 11);
    }
}
