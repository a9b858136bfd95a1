//! Per-socket reader/writer tasks bridging a `WebSocket` to the [`Broker`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use plugma_core::{ClientId, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::broker::{Broker, Registration};
use crate::connection::Outbound;

/// Why a socket session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the socket or the stream errored.
    PeerClosed,
    /// The broker terminated the connection (missed heartbeat).
    Terminated,
    /// The server is shutting down.
    Shutdown,
}

/// Drive one accepted socket until it closes.
///
/// Registers with the broker, pumps outbound frames, feeds inbound text
/// to the router and deregisters on exit.
pub async fn handle_socket(socket: WebSocket, role: Role, broker: Arc<Broker>, shutdown: CancellationToken) -> SessionEnd {
    let Registration { id, rx, terminate } = broker.on_connect(role);
    let (ws_tx, ws_rx) = socket.split();

    let mut writer = tokio::spawn(write_loop(ws_tx, rx, id.clone(), terminate.clone(), shutdown.clone()));
    let mut reader = tokio::spawn(read_loop(ws_rx, id.clone(), Arc::clone(&broker)));

    let end = tokio::select! {
        res = &mut writer => res.unwrap_or(SessionEnd::PeerClosed),
        _ = &mut reader => SessionEnd::PeerClosed,
    };
    writer.abort();
    reader.abort();

    if broker.on_close(&id) {
        debug!(client_id = %id, ?end, "socket session ended");
    } else {
        debug!(client_id = %id, ?end, "socket session ended after broker removal");
    }
    end
}

async fn write_loop<S>(
    mut ws_tx: S,
    mut rx: mpsc::Receiver<Outbound>,
    id: ClientId,
    terminate: CancellationToken,
    shutdown: CancellationToken,
) -> SessionEnd
where
    S: futures::Sink<Message> + Unpin,
{
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let message = match frame {
                    Some(Outbound::Text(text)) => Message::Text(text.as_ref().into()),
                    Some(Outbound::Probe) => {
                        trace!(client_id = %id, "sending probe");
                        Message::Ping(Vec::new().into())
                    }
                    None => return SessionEnd::PeerClosed,
                };
                if ws_tx.send(message).await.is_err() {
                    debug!(client_id = %id, "socket write failed");
                    return SessionEnd::PeerClosed;
                }
            }
            () = terminate.cancelled() => {
                // Dropping the sink without a close handshake.
                info!(client_id = %id, "terminating unresponsive socket");
                return SessionEnd::Terminated;
            }
            () = shutdown.cancelled() => {
                let close = Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                }));
                let _ = ws_tx.send(close).await;
                return SessionEnd::Shutdown;
            }
        }
    }
}

async fn read_loop<S>(mut ws_rx: S, id: ClientId, broker: Arc<Broker>)
where
    S: futures::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = ws_rx.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                debug!(client_id = %id, error = %e, "socket read error");
                break;
            }
        };
        match message {
            Message::Text(text) => dispatch(&broker, &id, text.as_str()),
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch(&broker, &id, text),
                Err(_) => warn!(client_id = %id, len = bytes.len(), "dropping non-UTF-8 binary frame"),
            },
            Message::Pong(_) => broker.mark_alive(&id),
            Message::Close(_) => break,
            // axum answers pings itself.
            Message::Ping(_) => {}
        }
    }
}

/// Route one inbound frame. A panic in routing is logged and the socket stays up.
fn dispatch(broker: &Broker, id: &ClientId, text: &str) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| broker.on_message(id, text))) {
        error!(client_id = %id, panic = %panic_message(panic.as_ref()), "message handler panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
