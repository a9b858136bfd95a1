//! One-shot observer lists for socket lifecycle transitions.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

/// Callback run once on a lifecycle transition.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by a subscription, used to remove it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pending one-shot callbacks for a single transition.
///
/// Callers decide whether the target state already holds: if so they run
/// the callback straight away with [`run_callback`] instead of subscribing.
#[derive(Default)]
pub struct ObserverList {
    pending: Vec<(ListenerId, Callback)>,
}

impl ObserverList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback to run on the next transition.
    pub fn subscribe(&mut self, callback: Callback) -> ListenerId {
        let id = ListenerId::next();
        self.pending.push((id, callback));
        id
    }

    /// Remove a callback that has not fired yet.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| *pending != id);
        self.pending.len() != before
    }

    /// Remove and return every pending callback in registration order.
    ///
    /// Run them after releasing any lock guarding the list.
    pub fn take(&mut self) -> Vec<Callback> {
        self.pending.drain(..).map(|(_, cb)| cb).collect()
    }

    /// Number of pending callbacks.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Run a callback behind a panic boundary.
pub fn run_callback(callback: Callback) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("lifecycle callback panicked");
    }
}

/// Run callbacks in order, each behind a panic boundary.
pub fn run_all(callbacks: Vec<Callback>) {
    for callback in callbacks {
        run_callback(callback);
    }
}
