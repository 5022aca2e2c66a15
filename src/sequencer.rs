//! Generation-checked application of page fetches.
//!
//! Every fetch is issued with the generation of the view at issue time.
//! When it completes, the store applies it only if the view still carries
//! that generation. Superseded fetches are also aborted, but that is an
//! optimization; the generation check alone keeps stale pages out.

use crate::collections::{CollectionStore, LoadTicket};
use crate::error::{Result, SyncError};
use crate::fetcher::PaginatedCollectionFetcher;
use crate::notices::{NoticeManager, SyncNotice};
use crate::session::AuthGate;
use crate::types::{Generation, Page, ViewId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};

/// What happened to a sequenced fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Page merged; `appended` new items.
    Applied { appended: usize },
    /// Failure recorded on the view.
    Failed { first_page: bool, message: String },
    /// The view moved on; the result was dropped.
    Stale,
    /// The session is gone; the load was abandoned.
    SessionExpired,
}

struct InFlight {
    generation: Generation,
    abort: AbortHandle,
}

/// Runs fetches so that only the current generation of a view can write
/// to it.
#[derive(Clone)]
pub struct RequestSequencer {
    store: CollectionStore,
    fetcher: PaginatedCollectionFetcher,
    notices: NoticeManager,
    auth: AuthGate,
    in_flight: Arc<Mutex<HashMap<ViewId, InFlight>>>,
}

impl RequestSequencer {
    pub fn new(
        store: CollectionStore,
        fetcher: PaginatedCollectionFetcher,
        notices: NoticeManager,
        auth: AuthGate,
    ) -> Self {
        Self {
            store,
            fetcher,
            notices,
            auth,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the page described by `ticket` and apply it.
    pub fn load(&self, ticket: LoadTicket) -> JoinHandle<SequenceOutcome> {
        let fetcher = self.fetcher.clone();
        let key = ticket.key.clone();
        let page = ticket.page;
        self.run(ticket, async move { fetcher.fetch_page(&key, page).await })
    }

    /// Run `task` for `ticket` and apply its result if the ticket's
    /// generation is still current when it completes.
    ///
    /// A task still running for an older generation of the same view is
    /// aborted.
    pub fn run<F>(&self, ticket: LoadTicket, task: F) -> JoinHandle<SequenceOutcome>
    where
        F: Future<Output = Result<Page>> + Send + 'static,
    {
        let view = ticket.view.clone();
        let generation = ticket.generation;
        let this = self.clone();

        // Registered under the lock so the task's release cannot run first.
        let mut in_flight = self.in_flight.lock();
        let handle = tokio::spawn(async move {
            let result = task.await;
            let outcome = this.complete(&ticket, result);
            this.release(&ticket.view, ticket.generation);
            outcome
        });
        let previous = in_flight.insert(
            view.clone(),
            InFlight {
                generation,
                abort: handle.abort_handle(),
            },
        );
        drop(in_flight);

        if let Some(previous) = previous {
            if previous.generation != generation {
                tracing::debug!(%view, superseded = ?previous.generation, "aborting superseded fetch");
                previous.abort.abort();
            }
        }

        handle
    }

    /// Best-effort abort of the view's in-flight fetch.
    pub fn cancel(&self, view: &ViewId) {
        if let Some(in_flight) = self.in_flight.lock().remove(view) {
            tracing::debug!(%view, generation = ?in_flight.generation, "cancelling fetch");
            in_flight.abort.abort();
        }
    }

    /// Abort every in-flight fetch.
    pub fn cancel_all(&self) {
        for (_, in_flight) in self.in_flight.lock().drain() {
            in_flight.abort.abort();
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn release(&self, view: &ViewId, generation: Generation) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(view).map(|f| f.generation) == Some(generation) {
            in_flight.remove(view);
        }
    }

    fn complete(&self, ticket: &LoadTicket, result: Result<Page>) -> SequenceOutcome {
        let view = &ticket.view;
        match result {
            Ok(page) => match self.store.apply_page(ticket, page) {
                Ok(appended) => {
                    tracing::debug!(%view, page = ticket.page, appended, "page applied");
                    self.notices.publish(SyncNotice::CollectionChanged {
                        view: view.clone(),
                        generation: ticket.generation,
                    });
                    SequenceOutcome::Applied { appended }
                }
                Err(_) => self.discard(ticket),
            },
            Err(error) if self.auth.intercept(&error) => {
                self.store.abandon_load(ticket);
                SequenceOutcome::SessionExpired
            }
            Err(error) => {
                let message = error.to_string();
                match self.store.apply_failure(ticket, message.clone()) {
                    Ok(()) => {
                        let first_page = ticket.page <= 1;
                        tracing::warn!(%view, page = ticket.page, error = %message, "page fetch failed");
                        self.notices.publish(SyncNotice::FetchFailed {
                            view: view.clone(),
                            generation: ticket.generation,
                            first_page,
                            message: message.clone(),
                        });
                        self.notices.publish(SyncNotice::CollectionChanged {
                            view: view.clone(),
                            generation: ticket.generation,
                        });
                        SequenceOutcome::Failed {
                            first_page,
                            message,
                        }
                    }
                    Err(SyncError::Stale) => self.discard(ticket),
                    Err(other) => SequenceOutcome::Failed {
                        first_page: ticket.page <= 1,
                        message: other.to_string(),
                    },
                }
            }
        }
    }

    fn discard(&self, ticket: &LoadTicket) -> SequenceOutcome {
        tracing::debug!(
            view = %ticket.view,
            generation = ?ticket.generation,
            "discarding stale fetch result"
        );
        SequenceOutcome::Stale
    }
}
