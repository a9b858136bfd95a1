//! Stand-in used when the socket transport is disabled or unsupported.

use plugma_core::{TransportTag, Via};
use serde_json::Value;
use tracing::{debug, warn};

use crate::frames::Listener;
use crate::local::Channels;
use crate::messenger::Messenger;
use crate::observer::{self, Callback, ListenerId};
use crate::options::TransportOptions;

/// Local-only messenger. Socket posts are dropped with a warning, and the
/// socket is always reported closed.
pub struct DisabledTransport {
    channels: Channels,
}

impl DisabledTransport {
    /// Build from the frame targets and window bus in `options`.
    pub fn new(options: &TransportOptions) -> Self {
        Self {
            channels: Channels::new(
                options.window.clone(),
                options.iframe_target.clone(),
                options.parent.clone(),
                None,
            ),
        }
    }
}

impl Messenger for DisabledTransport {
    fn post(&self, message: Value, via: Via) {
        for tag in via.iter() {
            if tag == TransportTag::Ws {
                warn!(%message, "socket transport is disabled, cannot send");
            } else {
                self.channels.post_local(tag, &message);
            }
        }
    }

    fn on(&self, listener: Listener, via: Via) -> ListenerId {
        self.channels.on(listener, &via)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.channels.off(id)
    }

    fn open(&self, _callback: Callback) -> Option<ListenerId> {
        debug!("socket transport is disabled, open callback will never run");
        None
    }

    fn on_closed(&self, callback: Callback) -> Option<ListenerId> {
        observer::run_callback(callback);
        None
    }

    fn close(&self, callback: Option<Callback>) -> Option<ListenerId> {
        warn!("socket transport is disabled, no connection to close");
        if let Some(callback) = callback {
            observer::run_callback(callback);
        }
        None
    }

    fn cancel(&self, _id: ListenerId) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{FrameSource, MessageEvent};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn disabled() -> DisabledTransport {
        DisabledTransport::new(&TransportOptions {
            enable_web_socket: false,
            ..TransportOptions::default()
        })
    }

    #[test]
    fn close_fires_immediately() {
        let transport = disabled();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        assert!(transport.close(Some(Box::new(move || flag.store(true, Ordering::SeqCst)))).is_none());
        assert!(fired.load(Ordering::SeqCst));
        assert!(!transport.is_connected());
    }

    #[test]
    fn closed_observer_fires_immediately() {
        let transport = disabled();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        assert!(transport.on_closed(Box::new(move || flag.store(true, Ordering::SeqCst))).is_none());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn open_never_fires() {
        let transport = disabled();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        assert!(transport.open(Box::new(move || flag.store(true, Ordering::SeqCst))).is_none());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn window_delivery_still_works() {
        let (logs, _guard) = plugma_telemetry::capture_logs();
        let transport = disabled();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = transport.on(
            Arc::new(move |e: &MessageEvent| sink.lock().push(e.source)),
            Via::from([TransportTag::Window, TransportTag::Ws]),
        );
        transport.post(json!({"event": "local"}), Via::from([TransportTag::Ws, TransportTag::Window]));
        assert_eq!(*seen.lock(), vec![FrameSource::Window]);
        assert!(logs.has_event(tracing::Level::WARN, "socket transport is disabled"));
    }
}
