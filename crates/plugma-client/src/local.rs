//! Non-socket channels plus the bookkeeping behind `on`/`off`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use plugma_core::{TransportTag, Via};
use serde_json::Value;
use tracing::{debug, warn};

use crate::frames::{FrameSource, FrameTarget, Listener, ListenerSet, MessageEvent, WindowBus};
use crate::observer::ListenerId;

enum Binding {
    Window(ListenerId),
    Socket(ListenerId),
}

/// The iframe, parent and window channels of one context.
pub(crate) struct Channels {
    window: Arc<WindowBus>,
    iframe: Option<Arc<dyn FrameTarget>>,
    parent: Option<Arc<dyn FrameTarget>>,
    socket_listeners: Option<Arc<ListenerSet>>,
    bindings: Mutex<HashMap<ListenerId, Vec<Binding>>>,
}

impl Channels {
    pub(crate) fn new(
        window: Arc<WindowBus>,
        iframe: Option<Arc<dyn FrameTarget>>,
        parent: Option<Arc<dyn FrameTarget>>,
        socket_listeners: Option<Arc<ListenerSet>>,
    ) -> Self {
        Self {
            window,
            iframe,
            parent,
            socket_listeners,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn window(&self) -> &Arc<WindowBus> {
        &self.window
    }

    /// Post through a non-socket channel. Unavailable channels log and drop.
    pub(crate) fn post_local(&self, tag: TransportTag, message: &Value) {
        let target = match tag {
            TransportTag::Iframe => self.iframe.as_deref(),
            TransportTag::Parent => self.parent.as_deref(),
            TransportTag::Window => Some(self.window.as_ref() as &dyn FrameTarget),
            TransportTag::Ws => None,
        };
        match target {
            Some(target) => {
                debug!(via = %tag, "post");
                target.post_message(message);
            }
            None => warn!(via = %tag, "cannot send message via unavailable transport"),
        }
    }

    /// Subscribe `listener` on every tag in `via` under one id.
    pub(crate) fn on(&self, listener: Listener, via: &Via) -> ListenerId {
        let mut bindings = Vec::new();
        for tag in via.iter() {
            let binding = match tag {
                TransportTag::Window => Some(Binding::Window(self.window.subscribe(Arc::clone(&listener)))),
                TransportTag::Parent => Some(Binding::Window(self.window.subscribe(from_source(&listener, FrameSource::Parent)))),
                TransportTag::Iframe => Some(Binding::Window(self.window.subscribe(from_source(&listener, FrameSource::Iframe)))),
                TransportTag::Ws => self
                    .socket_listeners
                    .as_ref()
                    .map(|set| Binding::Socket(set.add(Arc::clone(&listener)))),
            };
            match binding {
                Some(binding) => bindings.push(binding),
                None => warn!(via = %tag, "cannot add message listener via unavailable transport"),
            }
        }
        let id = ListenerId::next();
        let _ = self.bindings.lock().insert(id, bindings);
        id
    }

    /// Remove every binding created by one `on` call.
    pub(crate) fn off(&self, id: ListenerId) -> bool {
        let Some(bindings) = self.bindings.lock().remove(&id) else {
            return false;
        };
        for binding in bindings {
            let _ = match binding {
                Binding::Window(inner) => self.window.unsubscribe(inner),
                Binding::Socket(inner) => self.socket_listeners.as_ref().is_some_and(|set| set.remove(inner)),
            };
        }
        true
    }
}

/// Wrap `listener` so it only sees messages from `source`.
fn from_source(listener: &Listener, source: FrameSource) -> Listener {
    let inner = Arc::clone(listener);
    Arc::new(move |event: &MessageEvent| {
        if event.source == source {
            inner(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingFrame {
        posted: Mutex<Vec<Value>>,
    }

    impl FrameTarget for RecordingFrame {
        fn post_message(&self, message: &Value) {
            self.posted.lock().push(message.clone());
        }
    }

    fn counter() -> (Arc<Mutex<Vec<FrameSource>>>, Listener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Arc::new(move |e: &MessageEvent| sink.lock().push(e.source)))
    }

    #[test]
    fn posts_reach_held_frames() {
        let iframe = Arc::new(RecordingFrame::default());
        let parent = Arc::new(RecordingFrame::default());
        let channels = Channels::new(
            Arc::new(WindowBus::new()),
            Some(iframe.clone() as Arc<dyn FrameTarget>),
            Some(parent.clone() as Arc<dyn FrameTarget>),
            None,
        );
        channels.post_local(TransportTag::Iframe, &json!({"n": 1}));
        channels.post_local(TransportTag::Parent, &json!({"n": 2}));
        assert_eq!(*iframe.posted.lock(), vec![json!({"n": 1})]);
        assert_eq!(*parent.posted.lock(), vec![json!({"n": 2})]);
    }

    #[test]
    fn missing_frame_drops_quietly() {
        let channels = Channels::new(Arc::new(WindowBus::new()), None, None, None);
        channels.post_local(TransportTag::Iframe, &json!({}));
        channels.post_local(TransportTag::Parent, &json!({}));
    }

    #[test]
    fn parent_listener_filters_by_source() {
        let window = Arc::new(WindowBus::new());
        let channels = Channels::new(Arc::clone(&window), None, None, None);
        let (seen, listener) = counter();
        let _ = channels.on(listener, &Via::from(TransportTag::Parent));

        window.dispatch(&MessageEvent::json(json!({}), FrameSource::Other));
        window.dispatch(&MessageEvent::json(json!({}), FrameSource::Parent));
        window.dispatch(&MessageEvent::json(json!({}), FrameSource::Socket));
        assert_eq!(*seen.lock(), vec![FrameSource::Parent]);
    }

    #[test]
    fn window_listener_sees_everything_on_the_bus() {
        let window = Arc::new(WindowBus::new());
        let channels = Channels::new(Arc::clone(&window), None, None, None);
        let (seen, listener) = counter();
        let _ = channels.on(listener, &Via::from(TransportTag::Window));

        channels.post_local(TransportTag::Window, &json!({}));
        window.dispatch(&MessageEvent::json(json!({}), FrameSource::Socket));
        assert_eq!(*seen.lock(), vec![FrameSource::Window, FrameSource::Socket]);
    }

    #[test]
    fn off_removes_all_bindings() {
        let window = Arc::new(WindowBus::new());
        let sockets = Arc::new(ListenerSet::default());
        let channels = Channels::new(Arc::clone(&window), None, None, Some(Arc::clone(&sockets)));
        let (_, listener) = counter();
        let id = channels.on(listener, &Via::from([TransportTag::Window, TransportTag::Parent, TransportTag::Ws]));
        assert_eq!(window.listener_count(), 2);
        assert_eq!(sockets.len(), 1);

        assert!(channels.off(id));
        assert!(!channels.off(id));
        assert_eq!(window.listener_count(), 0);
        assert_eq!(sockets.len(), 0);
    }

    #[test]
    fn ws_listener_without_socket_is_skipped() {
        let channels = Channels::new(Arc::new(WindowBus::new()), None, None, None);
        let (_, listener) = counter();
        let id = channels.on(listener, &Via::default());
        assert!(channels.off(id));
    }
}
