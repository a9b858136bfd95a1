//! Per-role pending envelope queues.

use std::collections::VecDeque;

use plugma_core::{Envelope, Role};
use tracing::warn;

/// FIFO queues of envelopes addressed to a role with no live client.
///
/// Only `browser` and `plugin-window` have queues; `unknown` is never a
/// routing target.
#[derive(Debug)]
pub struct RoleQueues {
    browser: VecDeque<Envelope>,
    plugin_window: VecDeque<Envelope>,
    capacity: usize,
}

impl RoleQueues {
    /// Create empty queues holding at most `capacity` envelopes each.
    pub fn new(capacity: usize) -> Self {
        Self {
            browser: VecDeque::new(),
            plugin_window: VecDeque::new(),
            capacity,
        }
    }

    fn slot(&mut self, role: Role) -> Option<&mut VecDeque<Envelope>> {
        match role {
            Role::Browser => Some(&mut self.browser),
            Role::PluginWindow => Some(&mut self.plugin_window),
            Role::Unknown => None,
        }
    }

    fn slot_ref(&self, role: Role) -> Option<&VecDeque<Envelope>> {
        match role {
            Role::Browser => Some(&self.browser),
            Role::PluginWindow => Some(&self.plugin_window),
            Role::Unknown => None,
        }
    }

    /// Append an envelope. Returns `false` if `role` has no queue.
    ///
    /// When the queue is at capacity the oldest envelope is evicted.
    pub fn push(&mut self, role: Role, envelope: Envelope) -> bool {
        let capacity = self.capacity;
        let Some(queue) = self.slot(role) else {
            return false;
        };
        if capacity == 0 {
            warn!(%role, "role queue disabled, dropping envelope");
            return false;
        }
        if queue.len() >= capacity {
            let _ = queue.pop_front();
            warn!(%role, capacity, "role queue full, evicted oldest envelope");
        }
        queue.push_back(envelope);
        true
    }

    /// Remove and return every queued envelope for `role`, oldest first.
    pub fn take(&mut self, role: Role) -> Vec<Envelope> {
        self.slot(role)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Copy of the queued envelopes for `role`.
    pub fn snapshot(&self, role: Role) -> Vec<Envelope> {
        self.slot_ref(role)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of envelopes queued for `role`.
    pub fn len(&self, role: Role) -> usize {
        self.slot_ref(role).map_or(0, VecDeque::len)
    }

    /// Whether nothing is queued for any role.
    pub fn is_empty(&self) -> bool {
        self.browser.is_empty() && self.plugin_window.is_empty()
    }
}
