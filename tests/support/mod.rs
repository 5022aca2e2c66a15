//! Scripted remote service and push transport shared by the integration
//! tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use photo_sync::{
    ClientMessage, CollectionKey, Item, MutationAck, MutationKind, Notification, Page,
    PushConnection, PushEvent, PushTransport, RemoteApi, Result, Session, SyncConfig, SyncEngine,
    SyncError, UserId, UserProjection,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Failure a scripted call resolves to.
#[derive(Clone, Debug)]
pub enum Failure {
    Network,
    Auth,
    Server(&'static str),
}

impl Failure {
    fn into_error(self) -> SyncError {
        match self {
            Failure::Network => SyncError::Network("connection reset".into()),
            Failure::Auth => SyncError::Auth,
            Failure::Server(message) => SyncError::Server {
                status: Some(500),
                message: message.into(),
            },
        }
    }
}

struct Scripted<T> {
    reply: std::result::Result<T, Failure>,
    gate: Option<oneshot::Receiver<()>>,
}

impl<T> Scripted<T> {
    async fn resolve(self) -> Result<T> {
        if let Some(gate) = self.gate {
            let _ = gate.await;
        }
        self.reply.map_err(Failure::into_error)
    }
}

/// Releases a gated reply.
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn open(self) {
        let _ = self.0.send(());
    }
}

fn gated<T>(reply: std::result::Result<T, Failure>) -> (Scripted<T>, Gate) {
    let (tx, rx) = oneshot::channel();
    (
        Scripted {
            reply,
            gate: Some(rx),
        },
        Gate(tx),
    )
}

fn immediate<T>(reply: std::result::Result<T, Failure>) -> Scripted<T> {
    Scripted { reply, gate: None }
}

/// A call the engine made.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Page { key: CollectionKey, page: u32, limit: u32 },
    Mutation { kind: MutationKind, target: String },
    Notifications,
    FollowStatus(UserId),
}

#[derive(Default)]
struct ApiInner {
    pages: HashMap<(CollectionKey, u32), VecDeque<Scripted<Page>>>,
    mutations: HashMap<(MutationKind, String), VecDeque<Scripted<MutationAck>>>,
    notifications: VecDeque<Scripted<Vec<Notification>>>,
    follow: HashMap<UserId, VecDeque<Scripted<UserProjection>>>,
    calls: Vec<Call>,
}

/// [`RemoteApi`] whose replies are scripted per call. Replies are consumed
/// in order. Unscripted pages and follow lookups fail with a server
/// error; unscripted mutations succeed with an empty ack.
#[derive(Default)]
pub struct ScriptedApi {
    inner: Mutex<ApiInner>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, key: &CollectionKey, page: u32, reply: std::result::Result<Page, Failure>) {
        self.push_page(key, page, immediate(reply));
    }

    pub fn gated_page(
        &self,
        key: &CollectionKey,
        page: u32,
        reply: std::result::Result<Page, Failure>,
    ) -> Gate {
        let (scripted, gate) = gated(reply);
        self.push_page(key, page, scripted);
        gate
    }

    fn push_page(&self, key: &CollectionKey, page: u32, scripted: Scripted<Page>) {
        self.inner
            .lock()
            .pages
            .entry((key.clone(), page))
            .or_default()
            .push_back(scripted);
    }

    pub fn mutation(
        &self,
        kind: MutationKind,
        target: &str,
        reply: std::result::Result<MutationAck, Failure>,
    ) {
        self.push_mutation(kind, target, immediate(reply));
    }

    pub fn gated_mutation(
        &self,
        kind: MutationKind,
        target: &str,
        reply: std::result::Result<MutationAck, Failure>,
    ) -> Gate {
        let (scripted, gate) = gated(reply);
        self.push_mutation(kind, target, scripted);
        gate
    }

    fn push_mutation(&self, kind: MutationKind, target: &str, scripted: Scripted<MutationAck>) {
        self.inner
            .lock()
            .mutations
            .entry((kind, target.to_string()))
            .or_default()
            .push_back(scripted);
    }

    pub fn notifications(&self, reply: std::result::Result<Vec<Notification>, Failure>) {
        self.inner
            .lock()
            .notifications
            .push_back(immediate(reply));
    }

    pub fn gated_notifications(
        &self,
        reply: std::result::Result<Vec<Notification>, Failure>,
    ) -> Gate {
        let (scripted, gate) = gated(reply);
        self.inner.lock().notifications.push_back(scripted);
        gate
    }

    pub fn follow_status(&self, reply: std::result::Result<UserProjection, Failure>) {
        let user = match &reply {
            Ok(projection) => projection.user_id.clone(),
            Err(_) => UserId::new("unknown"),
        };
        self.inner
            .lock()
            .follow
            .entry(user)
            .or_default()
            .push_back(immediate(reply));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn page_calls(&self) -> Vec<(CollectionKey, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Page { key, page, .. } => Some((key, page)),
                _ => None,
            })
            .collect()
    }

    pub fn mutation_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Mutation { .. }))
            .count()
    }
}

#[async_trait]
impl RemoteApi for ScriptedApi {
    async fn fetch_page(&self, key: &CollectionKey, page: u32, limit: u32) -> Result<Page> {
        let scripted = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::Page {
                key: key.clone(),
                page,
                limit,
            });
            inner
                .pages
                .get_mut(&(key.clone(), page))
                .and_then(VecDeque::pop_front)
        };
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Err(SyncError::server(format!("unscripted page {}", page))),
        }
    }

    async fn apply_mutation(&self, kind: MutationKind, target: &str) -> Result<MutationAck> {
        let scripted = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::Mutation {
                kind,
                target: target.to_string(),
            });
            inner
                .mutations
                .get_mut(&(kind, target.to_string()))
                .and_then(VecDeque::pop_front)
        };
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Ok(MutationAck::default()),
        }
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let scripted = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::Notifications);
            inner.notifications.pop_front()
        };
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_follow_status(&self, user: &UserId) -> Result<UserProjection> {
        let scripted = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::FollowStatus(user.clone()));
            inner.follow.get_mut(user).and_then(VecDeque::pop_front)
        };
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Err(SyncError::server("unscripted follow status")),
        }
    }
}

/// Server side of a [`ChannelPush`] connection.
pub struct PushServer {
    pub received: mpsc::UnboundedReceiver<ClientMessage>,
    pub send: mpsc::UnboundedSender<PushEvent>,
}

/// [`PushTransport`] over in-memory channels.
#[derive(Default)]
pub struct ChannelPush {
    servers: Mutex<VecDeque<PushServer>>,
    opens: Mutex<usize>,
}

impl ChannelPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The server end of the oldest unclaimed connection.
    pub fn accept(&self) -> Option<PushServer> {
        self.servers.lock().pop_front()
    }

    pub fn opens(&self) -> usize {
        *self.opens.lock()
    }
}

#[async_trait]
impl PushTransport for ChannelPush {
    async fn open(&self, _token: &str) -> Result<PushConnection> {
        *self.opens.lock() += 1;
        let (tx_out, rx_out) = mpsc::unbounded_channel();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        self.servers.lock().push_back(PushServer {
            received: rx_out,
            send: tx_in,
        });
        Ok(PushConnection {
            outgoing: tx_out,
            incoming: rx_in,
            task: tokio::spawn(async {}),
        })
    }
}

// --- Fixtures ---

pub fn config() -> SyncConfig {
    SyncConfig {
        search_debounce: Duration::ZERO,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn session() -> Session {
    Session::new("tok-1", UserId::new("u1"))
}

pub fn engine(api: &Arc<ScriptedApi>) -> SyncEngine {
    engine_with_push(api, ChannelPush::new())
}

pub fn engine_with_push(api: &Arc<ScriptedApi>, push: Arc<ChannelPush>) -> SyncEngine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    SyncEngine::with_transports(config(), session(), api.clone(), push)
}

/// Page of plain items.
pub fn page(ids: &[&str], has_more: bool) -> Page {
    Page {
        items: ids.iter().map(|id| Item::new(*id)).collect(),
        has_more,
    }
}

pub fn page_of(items: Vec<Item>, has_more: bool) -> Page {
    Page { items, has_more }
}

pub fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|item| item.id.to_string()).collect()
}

/// Let spawned tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
