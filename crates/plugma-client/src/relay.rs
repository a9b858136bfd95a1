//! `RelayTransport`: the socket-backed [`Messenger`].

use std::sync::Arc;

use plugma_core::{Role, TransportTag, Via};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::{ClientError, Result};
use crate::frames::{Listener, WindowBus};
use crate::local::Channels;
use crate::messenger::Messenger;
use crate::observer::{Callback, ListenerId};
use crate::options::TransportOptions;
use crate::roster::RemoteClients;
use crate::socket::{self, ConnectionState, QueuedMessage, SocketShared};

/// Transport wrapper with a reconnecting relay socket.
///
/// Dropping it closes the socket and stops the driver.
pub struct RelayTransport {
    shared: Arc<SocketShared>,
    channels: Channels,
    role: Role,
    driver: JoinHandle<()>,
}

impl RelayTransport {
    /// Start the socket driver. Must be called inside a Tokio runtime.
    pub fn connect(options: TransportOptions) -> Result<Self> {
        let url = options.connect_url()?;
        if options.heartbeat_interval.is_zero() {
            return Err(ClientError::ZeroHeartbeat);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let shared = Arc::new(SocketShared::new(
            options.role,
            options.heartbeat_interval,
            Arc::clone(&options.window),
        ));
        let channels = Channels::new(
            options.window,
            options.iframe_target,
            options.parent,
            Some(Arc::clone(&shared.listeners)),
        );
        let driver = runtime.spawn(socket::run(Arc::clone(&shared), url, options.reconnect));

        Ok(Self {
            shared,
            channels,
            role: options.role,
            driver,
        })
    }

    /// Declared role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe_state()
    }

    /// Watch the `connected` flag.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.shared.subscribe_connected()
    }

    /// Watch the remote client roster.
    pub fn remote_clients(&self) -> watch::Receiver<RemoteClients> {
        self.shared.subscribe_roster()
    }

    /// Messages waiting for the socket to open.
    pub fn queued(&self) -> Vec<QueuedMessage> {
        self.shared.queued()
    }

    /// This context's window bus.
    pub fn window(&self) -> &Arc<WindowBus> {
        self.channels.window()
    }

    /// Whether the socket driver has stopped for good.
    pub fn is_finished(&self) -> bool {
        self.driver.is_finished()
    }
}

impl Messenger for RelayTransport {
    fn post(&self, message: Value, via: Via) {
        for tag in via.iter() {
            if tag == TransportTag::Ws {
                self.shared.send_or_queue(message.clone(), &via);
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

    fn open(&self, callback: Callback) -> Option<ListenerId> {
        self.shared.on_open(callback)
    }

    fn on_closed(&self, callback: Callback) -> Option<ListenerId> {
        self.shared.on_closed(callback)
    }

    fn close(&self, callback: Option<Callback>) -> Option<ListenerId> {
        self.shared.close(callback)
    }

    fn cancel(&self, id: ListenerId) -> bool {
        self.shared.cancel_observer(id)
    }

    fn is_connected(&self) -> bool {
        *self.shared.subscribe_connected().borrow()
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.shared.close_token().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugma_core::FixedDelay;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn connect_outside_runtime_fails() {
        let result = RelayTransport::connect(TransportOptions::new("ws://127.0.0.1:1/ws", Role::Browser));
        assert!(matches!(result, Err(ClientError::NoRuntime)));
    }

    #[tokio::test]
    async fn posts_queue_while_relay_is_unreachable() {
        let options = TransportOptions::new("ws://127.0.0.1:1/ws", Role::Browser)
            .with_reconnect(FixedDelay(Duration::from_secs(60)));
        let transport = RelayTransport::connect(options).unwrap();

        transport.post(json!({"pluginMessage": {"event": "custom"}}), Via::default());
        let queued = transport.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].via, Via::default());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn close_stops_the_driver() {
        let options = TransportOptions::new("ws://127.0.0.1:1/ws", Role::Browser)
            .with_reconnect(FixedDelay(Duration::from_secs(60)));
        let transport = RelayTransport::connect(options).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _ = transport.close(Some(Box::new(move || {
            let _ = tx.send(());
        })));
        tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !transport.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn zero_heartbeat_is_rejected_before_spawning() {
        let options = TransportOptions::new("ws://127.0.0.1:1/ws", Role::PluginWindow)
            .with_heartbeat_interval(Duration::ZERO);
        let result = RelayTransport::connect(options);
        assert!(matches!(result, Err(ClientError::ZeroHeartbeat)));
    }

    #[test]
    fn invalid_url_is_rejected_before_spawning() {
        let result = RelayTransport::connect(TransportOptions::new("localhost:9001", Role::Browser));
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }
}
