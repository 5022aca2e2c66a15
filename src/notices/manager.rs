//! Notice manager broadcasting engine notices to subscribers.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{DropReason, NoticeConfig, NoticeHandle, NoticeId, SyncNotice};

struct Subscriber {
    config: NoticeConfig,
    sender: Sender<SyncNotice>,
}

impl Subscriber {
    /// Returns false if the buffer is full or the receiver is gone.
    fn try_send(&self, notice: SyncNotice) -> bool {
        self.sender.try_send(notice).is_ok()
    }
}

#[derive(Default)]
struct Inner {
    subscribers: RwLock<HashMap<NoticeId, Subscriber>>,
    next_id: AtomicU64,
}

/// Manages notice subscriptions. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct NoticeManager {
    inner: Arc<Inner>,
}

impl NoticeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: NoticeConfig) -> NoticeHandle {
        let id = NoticeId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.inner
            .subscribers
            .write()
            .insert(id, Subscriber { config, sender });

        NoticeHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: NoticeId) {
        if let Some(sub) = self.inner.subscribers.write().remove(&id) {
            let _ = sub.sender.try_send(SyncNotice::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Publish a notice to matching subscribers. Drops subscribers that
    /// fail to receive.
    pub fn publish(&self, notice: SyncNotice) {
        let mut to_remove = Vec::new();

        {
            let subs = self.inner.subscribers.read();
            for (id, sub) in subs.iter() {
                if sub.config.filter.matches(&notice) && !sub.try_send(notice.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.inner.subscribers.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::debug!(subscriber = id.0, "dropping slow notice subscriber");
                    let _ = sub.sender.try_send(SyncNotice::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}
