//! Per-connection send handle held by the broker registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use plugma_core::{ClientId, ClientInfo, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A frame queued for a connection's socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame.
    Text(Arc<str>),
    /// Liveness probe (`WebSocket` ping control frame).
    Probe,
}

/// Send side of a connected client.
pub struct ClientConnection {
    /// Broker-assigned id.
    pub id: ClientId,
    /// Declared role.
    pub role: Role,
    tx: mpsc::Sender<Outbound>,
    terminate: CancellationToken,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection handle.
    pub fn new(id: ClientId, role: Role, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            role,
            tx,
            terminate: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Roster entry for this connection.
    pub fn info(&self) -> ClientInfo {
        ClientInfo::new(self.id.clone(), self.role)
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, text: Arc<str>) -> bool {
        self.push(Outbound::Text(text))
    }

    /// Queue a liveness probe.
    pub fn probe(&self) -> bool {
        self.push(Outbound::Probe)
    }

    fn push(&self, frame: Outbound) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Token cancelled when the broker forcibly terminates this connection.
    pub fn terminate_token(&self) -> CancellationToken {
        self.terminate.clone()
    }

    /// Forcibly terminate the socket without a close handshake.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
