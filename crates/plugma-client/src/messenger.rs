//! The uniform `post`/`on` contract and the transport factory.

use std::sync::Arc;

use plugma_core::Via;
use serde_json::Value;
use tracing::{info, warn};

use crate::disabled::DisabledTransport;
use crate::frames::Listener;
use crate::observer::{Callback, ListenerId};
use crate::options::TransportOptions;
use crate::relay::RelayTransport;

/// Send/receive over any mix of transports.
pub trait Messenger: Send + Sync {
    /// Post one message through every transport in `via`.
    ///
    /// Socket posts made while the socket is not open are queued.
    fn post(&self, message: Value, via: Via);

    /// Post several messages in order.
    fn post_all(&self, messages: Vec<Value>, via: Via) {
        for message in messages {
            self.post(message, via.clone());
        }
    }

    /// Subscribe `listener` on every transport in `via`.
    fn on(&self, listener: Listener, via: Via) -> ListenerId;

    /// Remove a subscription made with [`Messenger::on`].
    fn off(&self, id: ListenerId) -> bool;

    /// Run `callback` once the socket is open, or now if it already is.
    ///
    /// Returns an id while the callback is still pending.
    fn open(&self, callback: Callback) -> Option<ListenerId>;

    /// Run `callback` the next time the socket drops, or now if it is not
    /// open. Unlike [`Messenger::close`] this does not close anything.
    fn on_closed(&self, callback: Callback) -> Option<ListenerId>;

    /// Close the socket and stop reconnecting. `callback` runs once closed,
    /// or now if already closed.
    fn close(&self, callback: Option<Callback>) -> Option<ListenerId>;

    /// Remove a pending `open`/`close` callback.
    fn cancel(&self, id: ListenerId) -> bool;

    /// Whether the socket is currently open.
    fn is_connected(&self) -> bool;
}

/// Build the transport for one context.
///
/// Returns a socket-less stand-in when the socket is disabled or cannot be
/// started, so callers never branch on availability.
pub fn setup_transport(options: TransportOptions) -> Arc<dyn Messenger> {
    if !options.enable_web_socket {
        info!("socket transport disabled, using local-only messenger");
        return Arc::new(DisabledTransport::new(&options));
    }
    match RelayTransport::connect(options.clone()) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            warn!(error = %e, "socket transport unavailable, using local-only messenger");
            Arc::new(DisabledTransport::new(&options))
        }
    }
}
