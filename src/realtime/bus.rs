//! The realtime event bus.

use super::messages::{ClientMessage, EventKind, PushEvent};
use super::transport::{PushConnection, PushTransport};
use crate::api::with_timeout;
use crate::notices::{NoticeManager, SyncNotice};
use crate::session::AuthGate;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback invoked for each event of the kind it was registered for.
pub type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Returned by [`RealtimeEventBus::on`]; pass to
/// [`RealtimeEventBus::off`] to unregister.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.0)
    }
}

enum ConnState {
    Disconnected,
    /// A connect is awaiting the transport. `epoch` identifies it.
    Connecting { epoch: u64 },
    Connected(Live),
}

struct Live {
    epoch: u64,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    reader: JoinHandle<()>,
    transport: JoinHandle<()>,
}

impl Live {
    fn shutdown(self) {
        self.reader.abort();
        self.transport.abort();
    }
}

struct BusInner {
    transport: Arc<dyn PushTransport>,
    auth: AuthGate,
    notices: NoticeManager,
    /// Bound on opening the transport.
    open_timeout: Duration,
    handlers: RwLock<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_handler: AtomicU64,
    next_epoch: AtomicU64,
    state: Mutex<ConnState>,
}

/// Owns the session's push connection and dispatches its events.
#[derive(Clone)]
pub struct RealtimeEventBus {
    inner: Arc<BusInner>,
}

impl RealtimeEventBus {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        auth: AuthGate,
        notices: NoticeManager,
        open_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                transport,
                auth,
                notices,
                open_timeout,
                handlers: RwLock::new(HashMap::new()),
                next_handler: AtomicU64::new(1),
                next_epoch: AtomicU64::new(1),
                state: Mutex::new(ConnState::Disconnected),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.inner.state.lock(), ConnState::Connected(_))
    }

    /// Open the push connection and authenticate as the session's user.
    ///
    /// A no-op while a connection is open or being opened. An open that
    /// outlives the timeout counts as failed. Failures are logged and published as [`SyncNotice::PushDisconnected`]; they are
    /// not returned and not retried.
    pub async fn connect(&self) {
        let epoch = {
            let mut state = self.inner.state.lock();
            if !matches!(*state, ConnState::Disconnected) {
                tracing::debug!("push connect ignored; already connected or connecting");
                return;
            }
            let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
            *state = ConnState::Connecting { epoch };
            epoch
        };

        let session = self.inner.auth.session().clone();
        let opened = match session.token() {
            Ok(token) => {
                with_timeout(self.inner.open_timeout, self.inner.transport.open(token)).await
            }
            Err(e) => Err(e),
        };

        let connection = match opened {
            Ok(connection) => connection,
            Err(error) => {
                self.inner.auth.intercept(&error);
                let mut state = self.inner.state.lock();
                if matches!(*state, ConnState::Connecting { epoch: e } if e == epoch) {
                    *state = ConnState::Disconnected;
                }
                drop(state);
                tracing::warn!(error = %error, "push connect failed");
                self.inner.notices.publish(SyncNotice::PushDisconnected {
                    reason: error.to_string(),
                });
                return;
            }
        };

        let PushConnection {
            outgoing,
            incoming,
            task,
        } = connection;

        let authenticate = ClientMessage::Authenticate {
            user_id: session.user_id().to_string(),
        };
        if outgoing.send(authenticate).is_err() {
            tracing::warn!("push connection closed before authenticate");
        }

        {
            let mut state = self.inner.state.lock();
            // disconnect() ran while we were opening
            if !matches!(*state, ConnState::Connecting { epoch: e } if e == epoch) {
                task.abort();
                return;
            }
            // The reader needs the state lock to finish, so it cannot observe
            // the Connecting state we are about to replace.
            let reader = tokio::spawn(self.clone().read_loop(epoch, incoming));
            *state = ConnState::Connected(Live {
                epoch,
                outgoing,
                reader,
                transport: task,
            });
        }

        tracing::info!(user = %session.user_id(), "push connected");
        self.inner.notices.publish(SyncNotice::PushConnected);
    }

    /// Close the connection. Registered handlers are kept.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), ConnState::Disconnected);
        match previous {
            ConnState::Connected(live) => {
                live.shutdown();
                tracing::info!("push disconnected");
                self.inner.notices.publish(SyncNotice::PushDisconnected {
                    reason: "closed by client".into(),
                });
            }
            ConnState::Connecting { .. } => tracing::debug!("push connect abandoned"),
            ConnState::Disconnected => {}
        }
    }

    /// Send a frame on the open connection. Returns false when there is
    /// none.
    pub fn send(&self, message: ClientMessage) -> bool {
        match &*self.inner.state.lock() {
            ConnState::Connected(live) => live.outgoing.send(message).is_ok(),
            _ => false,
        }
    }

    // --- Handlers ---

    /// Register `handler` for `kind`. Handlers for one kind run in
    /// registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::SeqCst));
        self.inner
            .handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Unregister a handler. Returns false if it was not registered for
    /// `kind`.
    pub fn off(&self, kind: &EventKind, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let Some(list) = handlers.get_mut(kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(kind);
        }
        removed
    }

    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.inner.handlers.read().get(kind).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's kind.
    pub fn dispatch(&self, event: &PushEvent) {
        // Snapshot so handlers may call on/off.
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(kind = ?event.kind(), "no handlers for push event");
        }
        for handler in handlers {
            handler(event);
        }
    }

    async fn read_loop(self, epoch: u64, mut incoming: mpsc::UnboundedReceiver<PushEvent>) {
        while let Some(event) = incoming.recv().await {
            self.dispatch(&event);
        }

        let closed = {
            let mut state = self.inner.state.lock();
            let current = matches!(&*state, ConnState::Connected(live) if live.epoch == epoch);
            if current {
                if let ConnState::Connected(live) =
                    std::mem::replace(&mut *state, ConnState::Disconnected)
                {
                    live.transport.abort();
                }
            }
            current
        };
        if closed {
            tracing::warn!("push connection closed by server");
            self.inner.notices.publish(SyncNotice::PushDisconnected {
                reason: "connection closed".into(),
            });
        }
    }
}
