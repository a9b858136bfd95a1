//! Local message channels: the embedded frame, the parent frame and the
//! context's own window bus.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, trace};

use crate::observer::ListenerId;

/// Where an inbound message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSource {
    /// The enclosing frame.
    Parent,
    /// The embedded frame this context holds.
    Iframe,
    /// This context's own window channel.
    Window,
    /// The relay socket.
    Socket,
    /// Some other sender.
    Other,
}

/// Message body as delivered to listeners.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Parsed JSON.
    Json(Value),
    /// Text that was not valid JSON, passed through untouched.
    Raw(String),
}

impl Payload {
    /// The JSON value, if the payload parsed.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// A delivered message plus its origin.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    /// Message body.
    pub data: Payload,
    /// Origin of the message.
    pub source: FrameSource,
}

impl MessageEvent {
    /// JSON message from `source`.
    pub fn json(data: Value, source: FrameSource) -> Self {
        Self {
            data: Payload::Json(data),
            source,
        }
    }
}

/// Message listener.
pub type Listener = Arc<dyn Fn(&MessageEvent) + Send + Sync + 'static>;

/// A frame the host lets this context post messages into.
pub trait FrameTarget: Send + Sync {
    /// Deliver `message` to the frame's messaging channel.
    fn post_message(&self, message: &Value);
}

/// Registered listeners with removal by id.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Invoke every listener outside the lock, each behind a panic boundary.
    pub(crate) fn dispatch(&self, event: &MessageEvent) {
        let snapshot: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(source = ?event.source, "message listener panicked");
            }
        }
    }
}

/// The context's own message channel.
///
/// Host glue feeds frame messages in with [`WindowBus::dispatch`]; the
/// transport wrapper fans socket payloads into it as well.
#[derive(Default)]
pub struct WindowBus {
    listeners: ListenerSet,
}

impl WindowBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every message on the bus.
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Deliver a message to every subscriber.
    pub fn dispatch(&self, event: &MessageEvent) {
        trace!(source = ?event.source, listeners = self.listeners.len(), "window dispatch");
        self.listeners.dispatch(event);
    }

    /// Number of subscribers.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl FrameTarget for WindowBus {
    fn post_message(&self, message: &Value) {
        self.dispatch(&MessageEvent::json(message.clone(), FrameSource::Window));
    }
}
