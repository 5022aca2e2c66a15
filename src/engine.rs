//! The sync engine: every component wired around one session.

use crate::api::{with_timeout, HttpApi, RemoteApi};
use crate::collections::{CollectionState, CollectionStore};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::fetcher::PaginatedCollectionFetcher;
use crate::mutations::{MutationOutcome, MutationTarget, OptimisticMutationCoordinator};
use crate::notices::{NoticeConfig, NoticeFilter, NoticeHandle, NoticeManager, SyncNotice};
use crate::notifications::NotificationCenter;
use crate::realtime::{EventKind, HandlerId, PushEvent, PushTransport, RealtimeEventBus, WebSocketTransport};
use crate::sequencer::{RequestSequencer, SequenceOutcome};
use crate::session::{AuthGate, Credentials, NotificationPreferences, Session, SessionStore};
use crate::types::{
    CollectionKey, Item, ItemId, LoadStatus, MutationKind, Notification, UserId, UserProjection,
    ViewId,
};
use crate::viewport::ViewportLoadTrigger;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Facade over the synchronization core.
///
/// Provides a single interface for:
/// - Opening, paging and refreshing collection views
/// - Optimistic mutations of photos, users and notifications
/// - The notifications collection and its push channel
/// - Session lifecycle and persisted preferences
///
/// Methods that start network work spawn it on the current tokio runtime
/// and return its handle; dropping the handle does not cancel the work.
pub struct SyncEngine {
    config: SyncConfig,
    session: Session,
    api: Arc<dyn RemoteApi>,
    auth: AuthGate,
    notices: NoticeManager,
    store: CollectionStore,
    sequencer: RequestSequencer,
    mutations: OptimisticMutationCoordinator,
    notifications: NotificationCenter,
    bus: RealtimeEventBus,
    push_handler: Mutex<Option<HandlerId>>,
}

impl SyncEngine {
    /// Engine talking REST to `config.base_url` and WebSocket to
    /// `config.push_url`.
    pub fn open(config: SyncConfig, session: Session) -> Result<Self> {
        let api = Arc::new(HttpApi::new(&config, session.clone())?);
        let transport = Arc::new(WebSocketTransport::new(config.push_url.clone()));
        Ok(Self::with_transports(config, session, api, transport))
    }

    /// Persist `credentials` under `config.data_dir` and open an engine.
    pub fn sign_in(config: SyncConfig, credentials: Credentials) -> Result<Self> {
        let session = Session::persisted(credentials, SessionStore::new(&config.data_dir))?;
        Self::open(config, session)
    }

    /// Open an engine for the session saved by a previous run, if any.
    pub fn restore(config: SyncConfig) -> Result<Option<Self>> {
        match Session::restore(SessionStore::new(&config.data_dir))? {
            Some(session) => Ok(Some(Self::open(config, session)?)),
            None => Ok(None),
        }
    }

    /// Engine over caller-supplied transports.
    pub fn with_transports(
        config: SyncConfig,
        session: Session,
        api: Arc<dyn RemoteApi>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let notices = NoticeManager::new();
        let auth = AuthGate::new(session.clone(), notices.clone());
        let store = CollectionStore::new();
        let notifications = NotificationCenter::new();

        let fetcher = PaginatedCollectionFetcher::new(api.clone(), &config);
        let sequencer =
            RequestSequencer::new(store.clone(), fetcher, notices.clone(), auth.clone());
        let mutations = OptimisticMutationCoordinator::new(
            api.clone(),
            store.clone(),
            notifications.clone(),
            notices.clone(),
            auth.clone(),
            config.request_timeout,
        );
        let bus = RealtimeEventBus::new(
            transport,
            auth.clone(),
            notices.clone(),
            config.request_timeout,
        );

        Self {
            config,
            session,
            api,
            auth,
            notices,
            store,
            sequencer,
            mutations,
            notifications,
            bus,
            push_handler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn push(&self) -> &RealtimeEventBus {
        &self.bus
    }

    // --- Notices ---

    /// Subscribe to every notice.
    pub fn notices(&self) -> NoticeHandle {
        self.subscribe(NoticeFilter::all())
    }

    pub fn subscribe(&self, filter: NoticeFilter) -> NoticeHandle {
        self.notices.subscribe(NoticeConfig {
            buffer_size: self.config.notice_buffer_size,
            filter,
        })
    }

    // --- Collections ---

    /// Show `key` in `view`, loading its first page if the key changed.
    ///
    /// Reopening a view with its current key keeps what is loaded and
    /// returns None.
    pub fn open_collection(
        &self,
        view: &ViewId,
        key: CollectionKey,
    ) -> Option<JoinHandle<SequenceOutcome>> {
        let (_, reset) = self.store.open(view, key);
        if !reset {
            return None;
        }
        self.sequencer.cancel(view);
        self.load_next_page(view)
    }

    /// Show `query`'s results in `view`.
    ///
    /// The view is cleared at once; the first page is requested after the
    /// configured debounce, and only if no newer query replaced this one
    /// in the meantime.
    pub fn search(&self, view: &ViewId, query: &str) -> Option<JoinHandle<SequenceOutcome>> {
        let (generation, reset) = self.store.open(view, CollectionKey::search(query));
        if !reset {
            return None;
        }
        self.sequencer.cancel(view);
        self.notices.publish(SyncNotice::CollectionChanged {
            view: view.clone(),
            generation,
        });

        let store = self.store.clone();
        let sequencer = self.sequencer.clone();
        let debounce = self.config.search_debounce;
        let view = view.clone();
        Some(tokio::spawn(async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }
            if store.generation(&view) != Some(generation) {
                tracing::debug!(%view, ?generation, "search superseded during debounce");
                return SequenceOutcome::Stale;
            }
            match store.begin_load(&view) {
                Some(ticket) => sequencer
                    .load(ticket)
                    .await
                    .unwrap_or(SequenceOutcome::Stale),
                None => SequenceOutcome::Stale,
            }
        }))
    }

    /// Request the view's next page. None when the view is unknown,
    /// already loading or exhausted.
    pub fn load_next_page(&self, view: &ViewId) -> Option<JoinHandle<SequenceOutcome>> {
        let ticket = self.store.begin_load(view)?;
        tracing::debug!(%view, page = ticket.page, generation = ?ticket.generation, "loading page");
        Some(self.sequencer.load(ticket))
    }

    /// Start the view over from page one under a new generation.
    pub fn refresh(&self, view: &ViewId) -> Result<JoinHandle<SequenceOutcome>> {
        self.store.reset(view)?;
        self.sequencer.cancel(view);
        self.load_next_page(view)
            .ok_or_else(|| SyncError::InvalidOperation(format!("cannot load view {}", view)))
    }

    pub fn close_collection(&self, view: &ViewId) {
        self.sequencer.cancel(view);
        self.store.close(view);
    }

    pub fn snapshot(&self, view: &ViewId) -> Option<CollectionState> {
        self.store.snapshot(view)
    }

    pub fn items(&self, view: &ViewId) -> Vec<Item> {
        self.store.items(view)
    }

    pub fn load_status(&self, view: &ViewId) -> Option<LoadStatus> {
        self.store.load_status(view)
    }

    /// A load-more trigger for `view` that loads through this engine.
    ///
    /// Feed it `self.store().sentinel(view)` and `self.load_status(view)`.
    pub fn viewport(&self, view: &ViewId) -> ViewportLoadTrigger<impl FnMut() + Send + 'static> {
        let store = self.store.clone();
        let sequencer = self.sequencer.clone();
        let view = view.clone();
        ViewportLoadTrigger::new(move || {
            if let Some(ticket) = store.begin_load(&view) {
                drop(sequencer.load(ticket));
            }
        })
    }

    // --- Mutations ---

    /// Apply a mutation optimistically. See
    /// [`OptimisticMutationCoordinator::mutate`].
    pub fn mutate(
        &self,
        target: impl Into<String>,
        kind: MutationKind,
    ) -> Option<JoinHandle<MutationOutcome>> {
        self.mutations.mutate(target, kind)
    }

    /// Like or unlike depending on the photo's current state.
    pub fn toggle_like(&self, id: &ItemId) -> Option<JoinHandle<MutationOutcome>> {
        let kind = if self.store.interaction(id)?.liked {
            MutationKind::Unlike
        } else {
            MutationKind::Like
        };
        self.mutate(id.as_str(), kind)
    }

    /// Save or unsave depending on the photo's current state.
    pub fn toggle_save(&self, id: &ItemId) -> Option<JoinHandle<MutationOutcome>> {
        let kind = if self.store.interaction(id)?.saved {
            MutationKind::Unsave
        } else {
            MutationKind::Save
        };
        self.mutate(id.as_str(), kind)
    }

    /// Follow or unfollow. A user with no known projection is followed.
    pub fn toggle_follow(&self, user: &UserId) -> Option<JoinHandle<MutationOutcome>> {
        let following = self.store.user(user).is_some_and(|p| p.following);
        let kind = if following {
            MutationKind::Unfollow
        } else {
            MutationKind::Follow
        };
        self.mutate(user.as_str(), kind)
    }

    pub fn is_pending(&self, target: &MutationTarget, kind: MutationKind) -> bool {
        self.mutations.is_pending(target, kind)
    }

    // --- Users ---

    /// Fetch and cache `user`'s follow projection.
    ///
    /// While a follow mutation is pending the cached optimistic values are
    /// kept and returned.
    pub async fn fetch_follow_status(&self, user: &UserId) -> Result<UserProjection> {
        let call = self.api.fetch_follow_status(user);
        let fetched = match with_timeout(self.config.request_timeout, call).await {
            Ok(fetched) => fetched,
            Err(error) => {
                self.auth.intercept(&error);
                return Err(error);
            }
        };
        self.store.put_user(fetched.clone());
        Ok(self.store.user(user).unwrap_or(fetched))
    }

    pub fn user(&self, user: &UserId) -> Option<UserProjection> {
        self.store.user(user)
    }

    // --- Notifications ---

    /// Replace the notifications collection with the server's list.
    ///
    /// Notifications pushed while the request was in flight are kept. A
    /// refresh superseded by a newer one resolves Ok without applying.
    pub async fn refresh_notifications(&self) -> Result<()> {
        let generation = self.notifications.begin_refresh();
        let fetched = match with_timeout(
            self.config.request_timeout,
            self.api.fetch_notifications(),
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(error) => {
                if !self.auth.intercept(&error) {
                    tracing::warn!(error = %error, "notification refresh failed");
                }
                return Err(error);
            }
        };

        match self.notifications.apply_fetched(generation, fetched) {
            Ok(()) => {
                self.publish_unread();
                Ok(())
            }
            Err(SyncError::Stale) => {
                tracing::debug!(?generation, "discarding stale notification refresh");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn notification_list(&self) -> Vec<Notification> {
        self.notifications.list()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.unread_count()
    }

    fn publish_unread(&self) {
        self.notices.publish(SyncNotice::NotificationsChanged {
            unread_count: self.notifications.unread_count(),
        });
    }

    // --- Push ---

    /// Open the push channel, feeding notifications into the collection.
    ///
    /// Skipped when the stored preferences disable push.
    pub async fn connect_push(&self) {
        match self.preferences() {
            Ok(preferences) if !preferences.push_enabled => {
                tracing::info!("push disabled by preferences");
                return;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read preferences; connecting anyway"),
        }
        self.register_push_handler();
        self.bus.connect().await;
    }

    pub fn disconnect_push(&self) {
        self.bus.disconnect();
    }

    fn register_push_handler(&self) {
        let mut slot = self.push_handler.lock();
        if slot.is_some() {
            return;
        }
        let center = self.notifications.clone();
        let notices = self.notices.clone();
        let id = self.bus.on(EventKind::Notification, move |event| {
            let PushEvent::Notification(notification) = event else {
                return;
            };
            if center.push(notification.clone()) {
                notices.publish(SyncNotice::NotificationsChanged {
                    unread_count: center.unread_count(),
                });
            } else {
                tracing::debug!(id = %notification.id, "ignoring duplicate pushed notification");
            }
        });
        *slot = Some(id);
    }

    // --- Session ---

    /// Stored notification preferences; defaults for an in-memory session.
    pub fn preferences(&self) -> Result<NotificationPreferences> {
        match self.session.store() {
            Some(store) => store.load_preferences(),
            None => Ok(NotificationPreferences::default()),
        }
    }

    pub fn set_preferences(&self, preferences: &NotificationPreferences) -> Result<()> {
        let store = self.session.store().ok_or_else(|| {
            SyncError::InvalidOperation("session has no persistent store".into())
        })?;
        store.save_preferences(preferences)
    }

    /// End the session: close the push channel, abort fetches, drop every
    /// cached collection and delete the stored token.
    ///
    /// In-flight mutations still resolve but find nothing to update.
    pub fn sign_out(&self) {
        self.bus.disconnect();
        self.sequencer.cancel_all();
        self.store.clear();
        self.notifications.clear();
        if self.session.expire() {
            tracing::info!(user = %self.session.user_id(), "signed out");
        }
    }
}
