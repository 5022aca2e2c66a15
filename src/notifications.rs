//! The session-wide notifications collection.
//!
//! Unlike photo collections, notifications arrive from two directions:
//! pushed entries are prepended as they come in, and a full fetch replaces
//! the list. A fetch issued before a push arrived does not know about the
//! pushed entry, so the merge keeps it (deduplicated by id).

use crate::error::{Result, SyncError};
use crate::types::{Generation, Notification, NotificationId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct CenterInner {
    /// Newest first.
    items: Vec<Notification>,
    generation: Generation,
    /// Ids pushed since the current refresh began.
    pushed_since_refresh: Vec<NotificationId>,
    /// Ids with a mark-read in flight.
    pending_read: HashSet<NotificationId>,
    /// Ids with a delete in flight, with their latest read flag.
    removing: HashMap<NotificationId, bool>,
}

impl CenterInner {
    fn position(&self, id: &NotificationId) -> Option<usize> {
        self.items.iter().position(|n| &n.id == id)
    }
}

/// Shared handle to the notifications collection.
#[derive(Clone, Default)]
pub struct NotificationCenter {
    inner: Arc<Mutex<CenterInner>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<Notification> {
        self.inner.lock().items.clone()
    }

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        let inner = self.inner.lock();
        inner.position(id).map(|i| inner.items[i].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Always recomputed; never stored.
    pub fn unread_count(&self) -> usize {
        self.inner.lock().items.iter().filter(|n| !n.read).count()
    }

    /// Prepend a push-delivered notification. Returns false for an id
    /// already held (or being deleted).
    pub fn push(&self, notification: Notification) -> bool {
        let mut inner = self.inner.lock();
        if inner.removing.contains_key(&notification.id)
            || inner.position(&notification.id).is_some()
        {
            return false;
        }
        inner.pushed_since_refresh.push(notification.id.clone());
        inner.items.insert(0, notification);
        true
    }

    /// Start a full refresh. Only the returned generation may apply.
    pub fn begin_refresh(&self) -> Generation {
        let mut inner = self.inner.lock();
        inner.generation = inner.generation.next();
        inner.pushed_since_refresh.clear();
        inner.generation
    }

    /// Replace the list with a fetched one. Entries pushed after the
    /// refresh began stay on top; pending reads and deletes keep their
    /// optimistic effect.
    pub fn apply_fetched(&self, generation: Generation, fetched: Vec<Notification>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Err(SyncError::Stale);
        }

        let fetched_ids: HashSet<NotificationId> = fetched.iter().map(|n| n.id.clone()).collect();
        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(fetched.len() + inner.pushed_since_refresh.len());

        for id in &inner.pushed_since_refresh {
            if fetched_ids.contains(id) {
                continue;
            }
            if let Some(i) = inner.position(id) {
                if seen.insert(id.clone()) {
                    merged.push(inner.items[i].clone());
                }
            }
        }
        // pushed_since_refresh is oldest first; newest belongs on top
        merged.reverse();

        for mut notification in fetched {
            if inner.removing.contains_key(&notification.id) || !seen.insert(notification.id.clone())
            {
                continue;
            }
            if inner.pending_read.contains(&notification.id) {
                notification.read = true;
            }
            merged.push(notification);
        }

        inner.items = merged;
        inner.pushed_since_refresh.clear();
        Ok(())
    }

    // --- Optimistic Mutations ---

    /// Mark one notification read. Returns false if it is unknown or
    /// already read.
    pub fn begin_mark_read(&self, id: &NotificationId) -> bool {
        let mut inner = self.inner.lock();
        let Some(i) = inner.position(id) else {
            return false;
        };
        if inner.items[i].read {
            return false;
        }
        inner.items[i].read = true;
        inner.pending_read.insert(id.clone());
        true
    }

    /// Mark everything read. Returns the ids that flipped.
    pub fn begin_mark_all_read(&self) -> Vec<NotificationId> {
        let mut inner = self.inner.lock();
        let mut flipped = Vec::new();
        for notification in inner.items.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            flipped.push(notification.id.clone());
        }
        inner.pending_read.extend(flipped.iter().cloned());
        flipped
    }

    /// Resolve a mark-read. On rollback the ids become unread again.
    pub fn settle_read(&self, ids: &[NotificationId], rollback: bool) {
        let mut inner = self.inner.lock();
        for id in ids {
            inner.pending_read.remove(id);
            if rollback {
                if let Some(i) = inner.position(id) {
                    inner.items[i].read = false;
                } else if let Some(read) = inner.removing.get_mut(id) {
                    *read = false;
                }
            }
        }
    }

    /// Remove a notification, returning where it was.
    pub fn remove(&self, id: &NotificationId) -> Option<(usize, Notification)> {
        let mut inner = self.inner.lock();
        let i = inner.position(id)?;
        let notification = inner.items.remove(i);
        inner.removing.insert(id.clone(), notification.read);
        Some((i, notification))
    }

    pub fn finish_removal(&self, id: &NotificationId) {
        self.inner.lock().removing.remove(id);
    }

    /// Put a removed notification back at its original index.
    ///
    /// The read flag is the latest one, not the one it was removed with.
    pub fn restore(&self, index: usize, mut notification: Notification) {
        let mut inner = self.inner.lock();
        if let Some(read) = inner.removing.remove(&notification.id) {
            notification.read = read;
        }
        if inner.position(&notification.id).is_none() {
            let index = index.min(inner.items.len());
            inner.items.insert(index, notification);
        }
    }

    /// Forget everything (sign-out).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let generation = inner.generation.next();
        *inner = CenterInner {
            generation,
            ..Default::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: &str, read: bool) -> Notification {
        let mut notification = Notification::new(id, "2024-01-01T00:00:00Z");
        notification.read = read;
        notification
    }

    fn ids(center: &NotificationCenter) -> Vec<String> {
        center.list().into_iter().map(|n| n.id.0).collect()
    }

    #[test]
    fn test_push_prepends_and_counts_unread() {
        let center = NotificationCenter::new();
        let generation = center.begin_refresh();
        center.apply_fetched(generation, vec![n("a", true)]).unwrap();

        assert!(center.push(n("b", false)));
        assert!(center.push(n("c", false)));
        assert!(!center.push(n("c", false)));

        assert_eq!(ids(&center), vec!["c", "b", "a"]);
        assert_eq!(center.unread_count(), 2);
    }

    #[test]
    fn test_fetch_merge_dedupes_pushed() {
        let center = NotificationCenter::new();
        let generation = center.begin_refresh();

        // Pushed while the fetch was in flight
        center.push(n("x", false));
        center.push(n("y", false));

        // The fetch already includes "x" but not "y"
        center
            .apply_fetched(generation, vec![n("x", false), n("old", true)])
            .unwrap();

        assert_eq!(ids(&center), vec!["y", "x", "old"]);
        assert_eq!(center.unread_count(), 2);
    }

    #[test]
    fn test_stale_refresh_rejected() {
        let center = NotificationCenter::new();
        let old = center.begin_refresh();
        let current = center.begin_refresh();

        assert!(matches!(
            center.apply_fetched(old, vec![n("a", false)]),
            Err(SyncError::Stale)
        ));
        center.apply_fetched(current, vec![n("b", false)]).unwrap();
        assert_eq!(ids(&center), vec!["b"]);
    }

    #[test]
    fn test_pending_read_survives_refresh() {
        let center = NotificationCenter::new();
        let generation = center.begin_refresh();
        center.apply_fetched(generation, vec![n("a", false)]).unwrap();

        assert!(center.begin_mark_read(&NotificationId::new("a")));
        assert!(!center.begin_mark_read(&NotificationId::new("a")));

        let generation = center.begin_refresh();
        center.apply_fetched(generation, vec![n("a", false)]).unwrap();
        assert_eq!(center.unread_count(), 0);

        center.settle_read(&[NotificationId::new("a")], true);
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn test_mark_all_read_and_rollback() {
        let center = NotificationCenter::new();
        let generation = center.begin_refresh();
        center
            .apply_fetched(generation, vec![n("a", false), n("b", true), n("c", false)])
            .unwrap();

        let flipped = center.begin_mark_all_read();
        assert_eq!(flipped.len(), 2);
        assert_eq!(center.unread_count(), 0);

        center.settle_read(&flipped, true);
        assert_eq!(center.unread_count(), 2);
        assert!(center.get(&NotificationId::new("b")).unwrap().read);
    }

    #[test]
    fn test_remove_and_restore() {
        let center = NotificationCenter::new();
        let generation = center.begin_refresh();
        center
            .apply_fetched(generation, vec![n("a", false), n("b", false), n("c", false)])
            .unwrap();

        let (index, removed) = center.remove(&NotificationId::new("b")).unwrap();
        assert_eq!(index, 1);
        // A push of the same id while the delete is in flight is ignored
        assert!(!center.push(n("b", false)));

        center.restore(index, removed);
        assert_eq!(ids(&center), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_read_rollback_while_removed() {
        let center = NotificationCenter::new();
        let generation = center.begin_refresh();
        center.apply_fetched(generation, vec![n("a", false), n("b", false)]).unwrap();
        let a = NotificationId::new("a");

        assert!(center.begin_mark_read(&a));
        let (index, removed) = center.remove(&a).unwrap();
        assert!(removed.read);

        center.settle_read(&[a.clone()], true);
        center.restore(index, removed);
        assert!(!center.get(&a).unwrap().read);
        assert_eq!(center.unread_count(), 2);
    }
}
