//! Reconnecting relay socket: connection state machine, outbound queue,
//! inbound fan-out and the client-side heartbeat.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use plugma_core::{Envelope, EventKind, ReconnectPolicy, Role, Via};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::frames::{FrameSource, ListenerSet, MessageEvent, Payload, WindowBus};
use crate::observer::{self, Callback, ListenerId, ObserverList};
use crate::roster::RemoteClients;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// How long a client-requested close waits for the broker's close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Socket connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; either before the first attempt, between retries or closed for good.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open; sends go straight out.
    Open,
    /// Client-requested close in progress.
    Closing,
}

/// A message posted while the socket was not open.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedMessage {
    /// The message as posted.
    pub message: Value,
    /// The transports it was posted to.
    pub via: Via,
}

struct SocketState {
    state: ConnectionState,
    outbound: VecDeque<QueuedMessage>,
    sink: Option<mpsc::UnboundedSender<String>>,
    on_open: ObserverList,
    on_close: ObserverList,
}

/// State shared between the transport wrapper and its socket driver.
pub(crate) struct SocketShared {
    inner: Mutex<SocketState>,
    state_tx: watch::Sender<ConnectionState>,
    connected_tx: watch::Sender<bool>,
    roster_tx: watch::Sender<RemoteClients>,
    pub(crate) listeners: Arc<ListenerSet>,
    window: Arc<WindowBus>,
    close: CancellationToken,
    role: Role,
    heartbeat_interval: Duration,
}

impl SocketShared {
    pub(crate) fn new(role: Role, heartbeat_interval: Duration, window: Arc<WindowBus>) -> Self {
        Self {
            inner: Mutex::new(SocketState {
                state: ConnectionState::Disconnected,
                outbound: VecDeque::new(),
                sink: None,
                on_open: ObserverList::new(),
                on_close: ObserverList::new(),
            }),
            state_tx: watch::Sender::new(ConnectionState::Disconnected),
            connected_tx: watch::Sender::new(false),
            roster_tx: watch::Sender::new(RemoteClients::default()),
            listeners: Arc::new(ListenerSet::default()),
            window,
            close: CancellationToken::new(),
            role,
            heartbeat_interval,
        }
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub(crate) fn subscribe_roster(&self) -> watch::Receiver<RemoteClients> {
        self.roster_tx.subscribe()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub(crate) fn queued(&self) -> Vec<QueuedMessage> {
        self.inner.lock().outbound.iter().cloned().collect()
    }

    fn set_state(inner: &mut SocketState, tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
        inner.state = state;
        let _ = tx.send_replace(state);
    }

    /// Send now if open, otherwise append to the outbound queue.
    pub(crate) fn send_or_queue(&self, message: Value, via: &Via) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Open {
            if let Some(sink) = &inner.sink {
                match serde_json::to_string(&message) {
                    Ok(text) if sink.send(text.clone()).is_ok() => {
                        trace!("socket post");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "failed to encode message, dropping");
                        return;
                    }
                }
            }
        }
        debug!(state = ?inner.state, queued = inner.outbound.len() + 1, "socket not open, queuing message");
        inner.outbound.push_back(QueuedMessage {
            message,
            via: via.clone(),
        });
    }

    /// Send only if open. Used for heartbeat replies, which are never queued.
    fn send_now(&self, envelope: &Envelope) {
        let inner = self.inner.lock();
        let Some(sink) = inner.sink.as_ref().filter(|_| inner.state == ConnectionState::Open) else {
            return;
        };
        if let Ok(text) = envelope.to_json() {
            let _ = sink.send(text);
        }
    }

    /// Run `callback` now if open, otherwise on the next open.
    pub(crate) fn on_open(&self, callback: Callback) -> Option<ListenerId> {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Open {
            drop(inner);
            observer::run_callback(callback);
            None
        } else {
            Some(inner.on_open.subscribe(callback))
        }
    }

    /// Run `callback` on the next disconnect, or now if already disconnected.
    pub(crate) fn on_closed(&self, callback: Callback) -> Option<ListenerId> {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Disconnected {
            drop(inner);
            observer::run_callback(callback);
            None
        } else {
            Some(inner.on_close.subscribe(callback))
        }
    }

    /// Request a close. `callback` runs once the socket is disconnected.
    pub(crate) fn close(&self, callback: Option<Callback>) -> Option<ListenerId> {
        let id = callback.and_then(|callback| self.on_closed(callback));
        self.close.cancel();
        id
    }

    /// Remove a pending lifecycle callback.
    pub(crate) fn cancel_observer(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        inner.on_open.unsubscribe(id) || inner.on_close.unsubscribe(id)
    }

    pub(crate) fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    fn mark_connecting(&self) {
        Self::set_state(&mut self.inner.lock(), &self.state_tx, ConnectionState::Connecting);
    }

    fn mark_closing(&self) {
        Self::set_state(&mut self.inner.lock(), &self.state_tx, ConnectionState::Closing);
    }

    /// Transition to `Open`: flush the outbound queue, then run open observers.
    fn mark_open(&self, sink: mpsc::UnboundedSender<String>) {
        let mut inner = self.inner.lock();
        let pending: Vec<QueuedMessage> = inner.outbound.drain(..).collect();
        if !pending.is_empty() {
            info!(count = pending.len(), "flushing queued messages");
        }
        for queued in pending {
            match serde_json::to_string(&queued.message) {
                Ok(text) => {
                    let _ = sink.send(text);
                }
                Err(e) => warn!(error = %e, "failed to encode queued message, dropping"),
            }
        }
        inner.sink = Some(sink);
        Self::set_state(&mut inner, &self.state_tx, ConnectionState::Open);
        let callbacks = inner.on_open.take();
        drop(inner);

        let _ = self.connected_tx.send_replace(true);
        observer::run_all(callbacks);
    }

    /// Transition to `Disconnected` and run close observers.
    fn mark_disconnected(&self) {
        let mut inner = self.inner.lock();
        let was_connected = inner.sink.take().is_some();
        Self::set_state(&mut inner, &self.state_tx, ConnectionState::Disconnected);
        let callbacks = inner.on_close.take();
        drop(inner);

        if was_connected {
            info!("relay socket closed");
        }
        let _ = self.connected_tx.send_replace(false);
        observer::run_all(callbacks);
    }

    /// Handle one inbound text payload.
    fn handle_inbound(&self, text: &str) {
        let event = match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                if let Ok(envelope) = Envelope::from_json(value.clone()) {
                    self.observe(&envelope);
                }
                MessageEvent::json(value, FrameSource::Socket)
            }
            Err(e) => {
                warn!(error = %e, "socket payload is not JSON, delivering raw");
                MessageEvent {
                    data: Payload::Raw(text.to_owned()),
                    source: FrameSource::Socket,
                }
            }
        };
        self.listeners.dispatch(&event);
        self.window.dispatch(&event);
    }

    /// Roster bookkeeping and heartbeat replies.
    fn observe(&self, envelope: &Envelope) {
        let event = envelope.event();
        let _ = self.roster_tx.send_if_modified(|roster| roster.apply(event));
        match event {
            EventKind::Ping if self.role != Role::PluginWindow => {
                trace!(from = ?envelope.source, "answering ping");
                self.send_now(&Envelope::new(EventKind::Pong));
            }
            EventKind::Pong => trace!(from = ?envelope.source, "pong received"),
            _ => {}
        }
    }
}

/// Drive the socket until a close is requested or the policy gives up.
pub(crate) async fn run(shared: Arc<SocketShared>, url: String, policy: Arc<dyn ReconnectPolicy>) {
    let close = shared.close_token();
    let mut attempt: u32 = 0;

    while !close.is_cancelled() {
        shared.mark_connecting();
        debug!(url, attempt, "connecting to relay");
        let connected = tokio::select! {
            res = connect_async(url.as_str()) => Some(res),
            () = close.cancelled() => None,
        };
        match connected {
            None => break,
            Some(Ok((socket, _))) => {
                attempt = 0;
                info!(url, role = %shared.role, "relay socket open");
                run_session(&shared, socket, &close).await;
            }
            Some(Err(e)) => warn!(url, attempt, error = %e, "relay connect failed"),
        }
        shared.mark_disconnected();
        if close.is_cancelled() {
            break;
        }

        let Some(delay) = policy.delay(attempt) else {
            warn!(url, attempt, "reconnect attempts exhausted");
            break;
        };
        attempt = attempt.saturating_add(1);
        debug!(?delay, attempt, "reconnecting after delay");
        tokio::select! {
            () = time::sleep(delay) => {}
            () = close.cancelled() => break,
        }
    }

    shared.mark_disconnected();
    debug!(url, "socket driver stopped");
}

async fn run_session(shared: &SocketShared, socket: Socket, close: &CancellationToken) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    shared.mark_open(tx);

    let interval = shared.heartbeat_interval;
    let mut heartbeat = time::interval_at(Instant::now() + interval, interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let sends_pings = shared.role == Role::PluginWindow;

    loop {
        tokio::select! {
            Some(text) = rx.recv() => {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    debug!("socket write failed");
                    break;
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.handle_inbound(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => shared.handle_inbound(text),
                    Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                // tungstenite answers ping frames on the next read or write.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "socket read failed");
                    break;
                }
            },
            _ = heartbeat.tick(), if sends_pings => {
                if let Ok(ping) = Envelope::new(EventKind::Ping).to_json() {
                    if ws_tx.send(Message::Text(ping.into())).await.is_err() {
                        break;
                    }
                    trace!("sent ping");
                }
            }
            () = close.cancelled() => {
                shared.mark_closing();
                let _ = ws_tx.send(Message::Close(None)).await;
                let _ = time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
                    while let Some(Ok(frame)) = ws_rx.next().await {
                        if matches!(frame, Message::Close(_)) {
                            break;
                        }
                    }
                })
                .await;
                break;
            }
        }
    }
}
