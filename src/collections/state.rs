//! Per-view collection state and page merging.

use crate::types::{
    CollectionKey, Generation, InteractionState, Item, ItemId, LoadStatus, Page, Phase,
};
use serde::Serialize;
use std::collections::HashMap;

/// State of one collection view for one generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CollectionState {
    pub key: CollectionKey,
    /// Unique by id, insertion ordered.
    pub items: Vec<Item>,
    /// Next page to request (1-based).
    pub cursor: u32,
    pub has_more: bool,
    pub phase: Phase,
    pub generation: Generation,
    /// Message of the last surfaced fetch error, cleared on success.
    pub last_error: Option<String>,
}

impl CollectionState {
    /// Fresh state for a new generation.
    pub fn new(key: CollectionKey, generation: Generation) -> Self {
        Self {
            key,
            items: Vec::new(),
            cursor: 1,
            has_more: true,
            phase: Phase::Idle,
            generation,
            last_error: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| &item.id == id)
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn load_status(&self) -> LoadStatus {
        LoadStatus {
            phase: self.phase,
            has_more: self.has_more,
        }
    }

    /// Id of the last rendered item; the viewport trigger observes it.
    pub fn sentinel(&self) -> Option<&ItemId> {
        self.items.last().map(|item| &item.id)
    }

    /// Merge a successfully fetched page into this generation.
    ///
    /// Items already present are refreshed in place (payload always,
    /// interaction only when nothing is pending). New items are appended.
    /// Ids in `removing` are skipped and ids in `pending` take the
    /// optimistic interaction state instead of the fetched one.
    ///
    /// Returns the number of appended items.
    pub fn merge_page(
        &mut self,
        fetched_page: u32,
        page: Page,
        pending: &HashMap<ItemId, InteractionState>,
        removing: &HashMap<ItemId, InteractionState>,
    ) -> usize {
        let mut index: HashMap<ItemId, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();
        let mut appended = 0;

        for mut incoming in page.items {
            if removing.contains_key(&incoming.id) {
                continue;
            }
            if let Some(optimistic) = pending.get(&incoming.id) {
                incoming.interaction = optimistic.clone();
            }

            match index.get(&incoming.id) {
                Some(&i) => refresh_item(&mut self.items[i], incoming),
                None => {
                    index.insert(incoming.id.clone(), self.items.len());
                    self.items.push(incoming);
                    appended += 1;
                }
            }
        }

        // Never reverses within a generation
        self.has_more = self.has_more && page.has_more;
        self.cursor = self.cursor.max(fetched_page + 1);
        self.phase = Phase::Idle;
        self.last_error = None;

        appended
    }

    /// Record a failed fetch. The first page of a generation leaves the
    /// view empty; later pages keep what was loaded.
    pub fn record_failure(&mut self, fetched_page: u32, message: String) {
        if fetched_page <= 1 {
            self.items.clear();
        }
        self.phase = Phase::Error;
        self.last_error = Some(message);
    }

    /// Insert at `index` (clamped) unless the id is already present.
    pub(crate) fn restore_at(&mut self, index: usize, item: Item) -> bool {
        if self.position(&item.id).is_some() {
            return false;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        true
    }
}

fn refresh_item(existing: &mut Item, incoming: Item) {
    existing.payload = incoming.payload;
    if !existing.interaction.has_pending() {
        existing.interaction = incoming.interaction;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MutationKind;

    fn page(ids: &[&str], has_more: bool) -> Page {
        Page {
            items: ids.iter().map(|id| Item::new(*id)).collect(),
            has_more,
        }
    }

    fn state() -> CollectionState {
        CollectionState::new(CollectionKey::feed(), Generation(1))
    }

    #[test]
    fn test_merge_dedupes_by_id() {
        let mut state = state();
        let none = HashMap::new();
        let skip = HashMap::new();

        assert_eq!(state.merge_page(1, page(&["a", "b", "c"], true), &none, &skip), 3);
        // Offset shift on the server: page 2 repeats "c"
        assert_eq!(state.merge_page(2, page(&["c", "d", "d"], true), &none, &skip), 1);

        let ids: Vec<_> = state.ids().into_iter().map(|id| id.0).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(state.cursor, 3);
    }

    #[test]
    fn test_has_more_never_reverses() {
        let mut state = state();
        let none = HashMap::new();
        let skip = HashMap::new();

        state.merge_page(1, page(&["a"], false), &none, &skip);
        assert!(!state.has_more);
        state.merge_page(2, page(&["b"], true), &none, &skip);
        assert!(!state.has_more);
    }

    #[test]
    fn test_refresh_keeps_pending_interaction() {
        let mut state = state();
        let none = HashMap::new();
        let skip = HashMap::new();

        state.merge_page(1, page(&["a"], true), &none, &skip);
        {
            let item = state.get_mut(&ItemId::new("a")).unwrap();
            item.interaction.liked = true;
            item.interaction.like_count = 1;
            item.interaction.pending.insert(MutationKind::Like);
        }

        let refreshed = Page {
            items: vec![Item::new("a")
                .with_likes(false, 0)
                .with_field("title", serde_json::json!("renamed"))],
            has_more: true,
        };
        state.merge_page(2, refreshed, &none, &skip);

        let item = state.get(&ItemId::new("a")).unwrap();
        assert!(item.interaction.liked);
        assert_eq!(item.interaction.like_count, 1);
        assert_eq!(item.payload["title"], "renamed");
    }

    #[test]
    fn test_pending_overlay_and_removing() {
        let mut state = state();
        let mut pending = HashMap::new();
        let mut optimistic = InteractionState {
            saved: true,
            ..Default::default()
        };
        optimistic.pending.insert(MutationKind::Save);
        pending.insert(ItemId::new("b"), optimistic.clone());
        let removing: HashMap<_, _> = [(ItemId::new("c"), InteractionState::default())]
            .into_iter()
            .collect();

        state.merge_page(1, page(&["a", "b", "c"], true), &pending, &removing);

        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&ItemId::new("b")).unwrap().interaction, optimistic);
        assert!(state.get(&ItemId::new("c")).is_none());
    }

    #[test]
    fn test_failure_on_first_and_later_pages() {
        let none = HashMap::new();
        let skip = HashMap::new();

        let mut first = state();
        first.record_failure(1, "boom".into());
        assert!(first.is_empty());
        assert_eq!(first.phase, Phase::Error);

        let mut later = state();
        later.merge_page(1, page(&["a", "b"], true), &none, &skip);
        later.record_failure(2, "boom".into());
        assert_eq!(later.len(), 2);
        assert_eq!(later.phase, Phase::Error);
        assert_eq!(later.cursor, 2);
        assert_eq!(later.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_restore_at_clamps_and_skips_duplicates() {
        let mut state = state();
        state.merge_page(1, page(&["a", "b"], true), &HashMap::new(), &HashMap::new());

        assert!(state.restore_at(9, Item::new("z")));
        assert_eq!(state.position(&ItemId::new("z")), Some(2));
        assert!(!state.restore_at(0, Item::new("a")));
    }
}
