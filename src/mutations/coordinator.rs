//! Coordinator for optimistic mutations.

use super::types::{MutationOutcome, MutationRequest, MutationSnapshot, MutationTarget};
use crate::api::{with_timeout, RemoteApi};
use crate::collections::CollectionStore;
use crate::error::Result;
use crate::notices::{NoticeManager, SyncNotice};
use crate::notifications::NotificationCenter;
use crate::session::AuthGate;
use crate::types::{
    InteractionState, ItemId, MutationAck, MutationClass, MutationKind, UserId, UserProjection,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Applies mutations to the cache immediately and confirms or rolls them
/// back in the background.
#[derive(Clone)]
pub struct OptimisticMutationCoordinator {
    api: Arc<dyn RemoteApi>,
    store: CollectionStore,
    notifications: NotificationCenter,
    notices: NoticeManager,
    auth: AuthGate,
    timeout: Duration,
    in_flight: Arc<Mutex<HashSet<(MutationTarget, MutationClass)>>>,
}

impl OptimisticMutationCoordinator {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        store: CollectionStore,
        notifications: NotificationCenter,
        notices: NoticeManager,
        auth: AuthGate,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            store,
            notifications,
            notices,
            auth,
            timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// True while a mutation of `kind`'s class is in flight for `target`.
    pub fn is_pending(&self, target: &MutationTarget, kind: MutationKind) -> bool {
        self.in_flight
            .lock()
            .contains(&(target.clone(), kind.class()))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Apply `kind` to `target` optimistically and confirm it in the
    /// background.
    ///
    /// Returns None when the mutation is ignored: a conflicting mutation
    /// is already in flight, the target is not cached, or the change would
    /// be a no-op (liking a liked photo). Otherwise the returned handle
    /// resolves once the mutation is confirmed or rolled back; callers may
    /// drop it.
    pub fn mutate(
        &self,
        target: impl Into<String>,
        kind: MutationKind,
    ) -> Option<JoinHandle<MutationOutcome>> {
        let target = MutationTarget::for_kind(kind, target);
        let slot = (target.clone(), kind.class());

        // Claim the slot and apply in one critical section so two rapid
        // calls cannot both pass the guard.
        let request = {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains(&slot) || self.conflicts_with_bulk_read(&in_flight, &target, kind)
            {
                tracing::debug!(subject = %target, ?kind, "mutation already in flight; ignoring");
                return None;
            }
            let previous = self.apply_optimistic(&target, kind)?;
            in_flight.insert(slot.clone());
            MutationRequest {
                target,
                kind,
                previous,
                issued_at_generation: self.store.latest_generation(),
            }
        };

        self.publish_change(&request);

        let this = self.clone();
        Some(tokio::spawn(async move {
            let result = this.confirm(&request).await;
            let outcome = match result {
                Ok(ack) => {
                    this.reconcile(&request, &ack);
                    this.notices.publish(SyncNotice::MutationConfirmed {
                        target: request.target.to_string(),
                        kind: request.kind,
                    });
                    MutationOutcome::Confirmed
                }
                Err(error) => {
                    this.auth.intercept(&error);
                    this.rollback(&request);
                    let message = error.to_string();
                    tracing::warn!(
                        subject = %request.target,
                        kind = ?request.kind,
                        generation = ?request.issued_at_generation,
                        error = %message,
                        "mutation failed; rolled back"
                    );
                    this.notices.publish(SyncNotice::MutationRolledBack {
                        target: request.target.to_string(),
                        kind: request.kind,
                        message: message.clone(),
                    });
                    MutationOutcome::RolledBack { message }
                }
            };
            this.in_flight.lock().remove(&slot);
            this.publish_change(&request);
            outcome
        }))
    }

    /// Mark-all-read conflicts with any single mark-read and vice versa.
    fn conflicts_with_bulk_read(
        &self,
        in_flight: &HashSet<(MutationTarget, MutationClass)>,
        target: &MutationTarget,
        kind: MutationKind,
    ) -> bool {
        if kind.class() != MutationClass::ReadState {
            return false;
        }
        match target {
            MutationTarget::AllNotifications => in_flight
                .iter()
                .any(|(_, class)| *class == MutationClass::ReadState),
            _ => in_flight.contains(&(MutationTarget::AllNotifications, MutationClass::ReadState)),
        }
    }

    async fn confirm(&self, request: &MutationRequest) -> Result<MutationAck> {
        let call = self
            .api
            .apply_mutation(request.kind, request.target.as_str());
        with_timeout(self.timeout, call).await
    }

    // --- Optimistic Transitions ---

    fn apply_optimistic(&self, target: &MutationTarget, kind: MutationKind) -> Option<MutationSnapshot> {
        match (target, kind) {
            (MutationTarget::Item(id), MutationKind::Like | MutationKind::Unlike) => {
                self.begin_like(id, kind)
            }
            (MutationTarget::Item(id), MutationKind::Save | MutationKind::Unsave) => {
                self.begin_save(id, kind)
            }
            (MutationTarget::Item(id), MutationKind::Delete) => {
                let removed = self.store.remove_item(id);
                if removed.is_empty() {
                    self.store.finish_removal(id);
                    None
                } else {
                    Some(MutationSnapshot::Removed(removed))
                }
            }
            (MutationTarget::User(user), MutationKind::Follow | MutationKind::Unfollow) => {
                self.begin_follow(user, kind)
            }
            (MutationTarget::Notification(id), MutationKind::MarkRead) => self
                .notifications
                .begin_mark_read(id)
                .then(|| MutationSnapshot::Read(vec![id.clone()])),
            (MutationTarget::AllNotifications, MutationKind::MarkAllRead) => {
                let flipped = self.notifications.begin_mark_all_read();
                (!flipped.is_empty()).then(|| MutationSnapshot::Read(flipped))
            }
            (MutationTarget::Notification(id), MutationKind::DeleteNotification) => self
                .notifications
                .remove(id)
                .map(|(index, notification)| MutationSnapshot::RemovedNotification {
                    index,
                    notification,
                }),
            _ => None,
        }
    }

    fn begin_like(&self, id: &ItemId, kind: MutationKind) -> Option<MutationSnapshot> {
        let want = kind == MutationKind::Like;
        if self.store.interaction(id)?.liked == want {
            return None;
        }
        let previous = self.store.begin_item_mutation(id, |state| {
            state.liked = want;
            state.like_count = if want {
                state.like_count + 1
            } else {
                (state.like_count - 1).max(0)
            };
            state.pending.insert(kind);
        })?;
        Some(MutationSnapshot::Likes {
            liked: previous.liked,
            like_count: previous.like_count,
        })
    }

    fn begin_save(&self, id: &ItemId, kind: MutationKind) -> Option<MutationSnapshot> {
        let want = kind == MutationKind::Save;
        if self.store.interaction(id)?.saved == want {
            return None;
        }
        let previous = self.store.begin_item_mutation(id, |state| {
            state.saved = want;
            state.pending.insert(kind);
        })?;
        Some(MutationSnapshot::Saved {
            saved: previous.saved,
        })
    }

    fn begin_follow(&self, user: &UserId, kind: MutationKind) -> Option<MutationSnapshot> {
        let want = kind == MutationKind::Follow;
        let synthesized = self.store.user(user).is_none();
        if synthesized {
            // Unknown projection: assume the opposite state with no count;
            // the server's response fills in the real numbers.
            self.store
                .put_user(UserProjection::new(user.clone(), !want, 0));
        }
        if self.store.user(user)?.following == want {
            return None;
        }
        let previous = self.store.update_user(user, |projection| {
            projection.following = want;
            projection.follower_count = if want {
                projection.follower_count + 1
            } else {
                (projection.follower_count - 1).max(0)
            };
            projection.pending.insert(kind);
        })?;
        Some(MutationSnapshot::Follow {
            previous,
            synthesized,
        })
    }

    // --- Resolution ---

    fn reconcile(&self, request: &MutationRequest, ack: &MutationAck) {
        let kind = request.kind;
        match &request.target {
            MutationTarget::Item(id) => match kind {
                MutationKind::Delete => self.store.finish_removal(id),
                _ => {
                    self.store.settle_item(id, |state| {
                        state.pending.remove(&kind);
                        apply_item_ack(state, kind, ack);
                    });
                }
            },
            MutationTarget::User(user) => {
                self.store.update_user(user, |projection| {
                    projection.pending.remove(&kind);
                    if let Some(following) = ack.following {
                        projection.following = following;
                    }
                    if let Some(count) = ack.follower_count {
                        projection.follower_count = count;
                    }
                });
            }
            MutationTarget::Notification(id) if kind == MutationKind::DeleteNotification => {
                self.notifications.finish_removal(id)
            }
            MutationTarget::Notification(_) | MutationTarget::AllNotifications => {
                if let MutationSnapshot::Read(ids) = &request.previous {
                    self.notifications.settle_read(ids, false);
                }
            }
        }
    }

    fn rollback(&self, request: &MutationRequest) {
        let kind = request.kind;
        match (&request.target, &request.previous) {
            (MutationTarget::Item(id), MutationSnapshot::Likes { liked, like_count }) => {
                self.store.settle_item(id, |state| {
                    state.pending.remove(&kind);
                    state.liked = *liked;
                    state.like_count = *like_count;
                });
            }
            (MutationTarget::Item(id), MutationSnapshot::Saved { saved }) => {
                self.store.settle_item(id, |state| {
                    state.pending.remove(&kind);
                    state.saved = *saved;
                });
            }
            (MutationTarget::Item(id), MutationSnapshot::Removed(entries)) => {
                self.store.restore_removed(id, entries.clone());
            }
            (
                MutationTarget::User(user),
                MutationSnapshot::Follow {
                    synthesized: true, ..
                },
            ) => {
                self.store.remove_user(user);
            }
            (MutationTarget::User(user), MutationSnapshot::Follow { previous, .. }) => {
                self.store.update_user(user, |projection| {
                    projection.pending.remove(&kind);
                    projection.following = previous.following;
                    projection.follower_count = previous.follower_count;
                });
            }
            (_, MutationSnapshot::Read(ids)) => self.notifications.settle_read(ids, true),
            (
                _,
                MutationSnapshot::RemovedNotification {
                    index,
                    notification,
                },
            ) => self.notifications.restore(*index, notification.clone()),
            (target, snapshot) => {
                tracing::error!(subject = %target, ?snapshot, "snapshot does not match target");
            }
        }
    }

    fn publish_change(&self, request: &MutationRequest) {
        match &request.target {
            MutationTarget::Item(id) => {
                let mut views = self.store.views_holding(id);
                if let MutationSnapshot::Removed(entries) = &request.previous {
                    for entry in entries {
                        if !views.contains(&entry.view) {
                            views.push(entry.view.clone());
                        }
                    }
                }
                for view in views {
                    if let Some(generation) = self.store.generation(&view) {
                        self.notices
                            .publish(SyncNotice::CollectionChanged { view, generation });
                    }
                }
            }
            MutationTarget::Notification(_) | MutationTarget::AllNotifications => {
                self.notices.publish(SyncNotice::NotificationsChanged {
                    unread_count: self.notifications.unread_count(),
                });
            }
            MutationTarget::User(_) => {}
        }
    }
}

/// Overwrite optimistic guesses with the server's values.
fn apply_item_ack(state: &mut InteractionState, kind: MutationKind, ack: &MutationAck) {
    match kind {
        MutationKind::Like | MutationKind::Unlike => {
            if let Some(liked) = ack.liked {
                state.liked = liked;
            }
            if let Some(count) = ack.like_count {
                state.like_count = count;
            }
        }
        MutationKind::Save | MutationKind::Unsave => {
            if let Some(saved) = ack.saved {
                state.saved = saved;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::session::Session;
    use crate::types::{CollectionKey, Item, Notification, NotificationId, Page, ViewId};
    use async_trait::async_trait;

    /// Confirms likes with a fixed count, or fails every call.
    struct Server {
        fail: bool,
    }

    #[async_trait]
    impl RemoteApi for Server {
        async fn fetch_page(&self, _: &CollectionKey, _: u32, _: u32) -> Result<Page> {
            Ok(Page::default())
        }

        async fn apply_mutation(&self, _: MutationKind, _: &str) -> Result<MutationAck> {
            if self.fail {
                return Err(SyncError::Network("connection reset".into()));
            }
            Ok(MutationAck {
                liked: Some(true),
                like_count: Some(9),
                ..Default::default()
            })
        }

        async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
            Ok(Vec::new())
        }

        async fn fetch_follow_status(&self, user: &UserId) -> Result<UserProjection> {
            Ok(UserProjection::new(user.clone(), false, 0))
        }
    }

    fn coordinator(fail: bool) -> (OptimisticMutationCoordinator, CollectionStore, NotificationCenter) {
        let store = CollectionStore::new();
        let notifications = NotificationCenter::new();
        let notices = NoticeManager::new();
        let auth = AuthGate::new(Session::new("tok", UserId::new("u1")), notices.clone());
        let coordinator = OptimisticMutationCoordinator::new(
            Arc::new(Server { fail }),
            store.clone(),
            notifications.clone(),
            notices,
            auth,
            Duration::from_secs(1),
        );
        (coordinator, store, notifications)
    }

    fn seed(store: &CollectionStore, items: Vec<Item>) {
        let view = ViewId::new("home");
        store.open(&view, CollectionKey::feed());
        let ticket = store.begin_load(&view).unwrap();
        store
            .apply_page(&ticket, Page { items, has_more: false })
            .unwrap();
    }

    #[tokio::test]
    async fn test_like_confirms_with_server_count() {
        let (coordinator, store, _) = coordinator(false);
        seed(&store, vec![Item::new("p1").with_likes(false, 2)]);

        let handle = coordinator.mutate("p1", MutationKind::Like).unwrap();
        let optimistic = store.interaction(&ItemId::new("p1")).unwrap();
        assert!(optimistic.liked);
        assert_eq!(optimistic.like_count, 3);
        assert!(coordinator.is_pending(&MutationTarget::Item(ItemId::new("p1")), MutationKind::Unlike));

        assert_eq!(handle.await.unwrap(), MutationOutcome::Confirmed);
        let settled = store.interaction(&ItemId::new("p1")).unwrap();
        assert_eq!(settled.like_count, 9);
        assert!(!settled.has_pending());
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_second_toggle_ignored_while_in_flight() {
        let (coordinator, store, _) = coordinator(false);
        seed(&store, vec![Item::new("p1").with_likes(false, 2)]);

        let first = coordinator.mutate("p1", MutationKind::Like);
        assert!(first.is_some());
        assert!(coordinator.mutate("p1", MutationKind::Unlike).is_none());
        assert!(coordinator.mutate("p1", MutationKind::Save).is_some());
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let (coordinator, store, _) = coordinator(true);
        seed(&store, vec![Item::new("p1").with_saved(false)]);

        let handle = coordinator.mutate("p1", MutationKind::Save).unwrap();
        assert!(store.interaction(&ItemId::new("p1")).unwrap().saved);

        match handle.await.unwrap() {
            MutationOutcome::RolledBack { message } => assert!(message.contains("connection reset")),
            other => panic!("Expected rollback, got {:?}", other),
        }
        assert!(!store.interaction(&ItemId::new("p1")).unwrap().saved);
    }

    #[tokio::test]
    async fn test_noop_and_unknown_targets_ignored() {
        let (coordinator, store, _) = coordinator(false);
        seed(&store, vec![Item::new("p1").with_likes(true, 4)]);

        assert!(coordinator.mutate("p1", MutationKind::Like).is_none());
        assert!(coordinator.mutate("missing", MutationKind::Like).is_none());
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_bulk_read_excludes_single_read() {
        let (coordinator, _, notifications) = coordinator(false);
        notifications.push(Notification::new("n1", "2024-01-01T00:00:00Z"));
        notifications.push(Notification::new("n2", "2024-01-02T00:00:00Z"));

        let bulk = coordinator.mutate("", MutationKind::MarkAllRead).unwrap();
        assert_eq!(notifications.unread_count(), 0);

        // Arrives while the bulk read is in flight
        notifications.push(Notification::new("n3", "2024-01-03T00:00:00Z"));
        assert!(coordinator.mutate("n3", MutationKind::MarkRead).is_none());

        assert_eq!(bulk.await.unwrap(), MutationOutcome::Confirmed);
        assert!(notifications.get(&NotificationId::new("n1")).unwrap().read);
        assert!(!notifications.get(&NotificationId::new("n3")).unwrap().read);
        assert!(coordinator.mutate("n3", MutationKind::MarkRead).is_some());
    }
}
