//! Turns sentinel visibility into load-more requests.
//!
//! The host reports whether the sentinel (the last rendered item) is in
//! view. A crossing is the sentinel coming into view; each crossing fires
//! at most once, and only when the view is idle with more pages to load.

use crate::types::{ItemId, LoadStatus};

pub struct ViewportLoadTrigger<F> {
    on_intersect: F,
    sentinel: Option<ItemId>,
    armed: bool,
    fired: u64,
}

impl<F: FnMut()> ViewportLoadTrigger<F> {
    pub fn new(on_intersect: F) -> Self {
        Self {
            on_intersect,
            sentinel: None,
            armed: true,
            fired: 0,
        }
    }

    /// Track `sentinel`. A different sentinel (items were appended or the
    /// collection was replaced) starts a new crossing.
    pub fn observe(&mut self, sentinel: Option<ItemId>) {
        if self.sentinel != sentinel {
            tracing::trace!(?sentinel, "viewport sentinel changed");
            self.sentinel = sentinel;
            self.armed = true;
        }
    }

    pub fn sentinel(&self) -> Option<&ItemId> {
        self.sentinel.as_ref()
    }

    /// Report the sentinel's visibility. Returns true if `on_intersect`
    /// ran.
    ///
    /// A crossing that arrives while the view is loading, or has no more
    /// pages, does not fire but stays armed.
    pub fn report(&mut self, intersecting: bool, status: LoadStatus) -> bool {
        if !intersecting {
            self.armed = true;
            return false;
        }
        if !self.armed || !status.can_load_more() {
            return false;
        }
        self.armed = false;
        self.fired += 1;
        (self.on_intersect)();
        true
    }

    /// How many times `on_intersect` has run.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl<F> std::fmt::Debug for ViewportLoadTrigger<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportLoadTrigger")
            .field("sentinel", &self.sentinel)
            .field("armed", &self.armed)
            .field("fired", &self.fired)
            .finish()
    }
}
