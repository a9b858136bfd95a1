//! Client registry, role-complement routing and per-role queues.
//!
//! All mutable broker state lives behind one mutex, so check-then-enqueue
//! and flush-then-clear sequences never interleave with other handlers or
//! with the heartbeat tick.

use std::sync::Arc;

use parking_lot::Mutex;
use plugma_core::{ClientId, ClientInfo, Envelope, EventKind, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::connection::{ClientConnection, Outbound};
use crate::metrics;
use crate::queue::RoleQueues;

/// What the router did with an envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to this many live connections.
    Delivered {
        /// Number of recipients.
        recipients: usize,
    },
    /// No live target existed; appended to the role's queue.
    Queued {
        /// Queue the envelope was appended to.
        role: Role,
    },
    /// Discarded (transient event with no live target, or no queue for the target).
    Dropped,
}

/// Handed to the socket task when a client connects.
pub struct Registration {
    /// Broker-assigned id.
    pub id: ClientId,
    /// Frames to write to the socket.
    pub rx: mpsc::Receiver<Outbound>,
    /// Cancelled when the broker terminates the connection.
    pub terminate: CancellationToken,
}

struct ClientRecord {
    connection: ClientConnection,
    alive: bool,
}

struct BrokerState {
    clients: Vec<ClientRecord>,
    queues: RoleQueues,
}

impl BrokerState {
    fn find(&self, id: &ClientId) -> Option<&ClientRecord> {
        self.clients.iter().find(|r| &r.connection.id == id)
    }

    fn remove(&mut self, id: &ClientId) -> Option<ClientRecord> {
        let pos = self.clients.iter().position(|r| &r.connection.id == id)?;
        Some(self.clients.remove(pos))
    }

    /// Send an envelope to every registered client except `exclude`.
    fn broadcast_except(&self, envelope: &Envelope, exclude: &ClientId) -> usize {
        let Some(text) = encode(envelope) else {
            return 0;
        };
        let mut recipients = 0;
        for record in self.clients.iter().filter(|r| &r.connection.id != exclude) {
            deliver(&record.connection, &text);
            recipients += 1;
        }
        recipients
    }

    fn route(&mut self, envelope: Envelope, sender: &ClientId, sender_role: Role) -> RouteOutcome {
        let target_role = sender_role.complement();
        let targets: Vec<&ClientRecord> = self
            .clients
            .iter()
            .filter(|r| &r.connection.id != sender)
            .filter(|r| target_role.is_none_or(|role| r.connection.role == role))
            .collect();

        if !targets.is_empty() {
            let Some(text) = encode(&envelope) else {
                return RouteOutcome::Dropped;
            };
            for record in &targets {
                deliver(&record.connection, &text);
            }
            metrics::counter_inc(metrics::MESSAGES_ROUTED_TOTAL);
            return RouteOutcome::Delivered {
                recipients: targets.len(),
            };
        }

        let Some(role) = target_role else {
            debug!(%sender, "no other clients for unknown-role sender, dropping");
            metrics::counter_inc(metrics::MESSAGES_DROPPED_TOTAL);
            return RouteOutcome::Dropped;
        };
        if envelope.event().is_transient() {
            debug!(%sender, event = ?envelope.event().name(), %role, "no live target for transient event, dropping");
            metrics::counter_inc(metrics::MESSAGES_DROPPED_TOTAL);
            return RouteOutcome::Dropped;
        }
        if self.queues.push(role, envelope) {
            debug!(%sender, %role, queued = self.queues.len(role), "no live target, queued");
            metrics::counter_inc(metrics::MESSAGES_QUEUED_TOTAL);
            RouteOutcome::Queued { role }
        } else {
            metrics::counter_inc(metrics::MESSAGES_DROPPED_TOTAL);
            RouteOutcome::Dropped
        }
    }
}

fn encode(envelope: &Envelope) -> Option<Arc<str>> {
    match envelope.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(error = %e, "failed to serialize envelope");
            None
        }
    }
}

fn deliver(connection: &ClientConnection, text: &Arc<str>) {
    if !connection.send(Arc::clone(text)) {
        warn!(client_id = %connection.id, "failed to send to client, dropping frame");
        metrics::counter_inc(metrics::SEND_DROPS_TOTAL);
    }
}

/// The relay broker.
///
/// One instance owns its registry and queues; multiple brokers can coexist
/// in a single process.
pub struct Broker {
    state: Mutex<BrokerState>,
    config: BrokerConfig,
}

impl Broker {
    /// Create a broker with empty registry and queues.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            state: Mutex::new(BrokerState {
                clients: Vec::new(),
                queues: RoleQueues::new(config.max_queued_per_role),
            }),
            config,
        }
    }

    /// Broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Register a new connection.
    ///
    /// The new client receives a `client_list` of every other client, then
    /// any envelopes queued for its role. Every other client is told about
    /// the arrival with `client_connected`.
    pub fn on_connect(&self, role: Role) -> Registration {
        let mut state = self.state.lock();
        let pending = state.queues.take(role);

        // The roster and the flushed batch must not eat into the normal send buffer.
        let (tx, rx) = mpsc::channel(self.config.max_send_queue + pending.len() + 1);
        let id = ClientId::new();
        let connection = ClientConnection::new(id.clone(), role, tx);
        let terminate = connection.terminate_token();

        let others: Vec<ClientInfo> = state.clients.iter().map(|r| r.connection.info()).collect();
        let list = Envelope::new(EventKind::ClientList { clients: others });
        if let Some(text) = encode(&list) {
            deliver(&connection, &text);
        }

        if !pending.is_empty() {
            info!(client_id = %id, %role, count = pending.len(), "flushing queued envelopes");
        }
        for envelope in &pending {
            if let Some(text) = encode(envelope) {
                deliver(&connection, &text);
            }
        }

        let info = connection.info();
        state.clients.push(ClientRecord {
            connection,
            alive: true,
        });
        let announce = Envelope::new(EventKind::ClientConnected { client: info }).with_source(role);
        let _ = state.broadcast_except(&announce, &id);
        let total = state.clients.len();
        drop(state);

        info!(client_id = %id, %role, total, "client connected");
        metrics::counter_inc(metrics::CONNECTIONS_TOTAL);
        metrics::gauge_set(metrics::CONNECTIONS_ACTIVE, total);

        Registration { id, rx, terminate }
    }

    /// Handle a raw text frame from `sender`.
    ///
    /// Malformed JSON is logged and dropped. Returns `None` when nothing
    /// was routed.
    pub fn on_message(&self, sender: &ClientId, raw: &str) -> Option<RouteOutcome> {
        let mut envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(client_id = %sender, error = %e, "dropping malformed message");
                metrics::counter_inc(metrics::MESSAGES_MALFORMED_TOTAL);
                return None;
            }
        };

        let mut state = self.state.lock();
        let Some(sender_role) = state.find(sender).map(|r| r.connection.role) else {
            warn!(client_id = %sender, "message from unregistered client, dropping");
            return None;
        };
        if matches!(envelope.event(), EventKind::Pong) {
            Self::mark_alive_locked(&mut state, sender);
        }

        envelope.source = Some(sender_role);
        let outcome = state.route(envelope, sender, sender_role);
        debug!(client_id = %sender, role = %sender_role, ?outcome, "routed message");
        Some(outcome)
    }

    /// Route an envelope from `sender` to the complement of `sender_role`.
    ///
    /// `client_connected`, `client_disconnected`, `ping` and `pong` are
    /// delivered only to live targets and never queued. Anything else is
    /// queued for the target role when no client of that role is live.
    /// Messages from `unknown` senders go to every other client and are
    /// never queued.
    pub fn route(&self, envelope: Envelope, sender: &ClientId, sender_role: Role) -> RouteOutcome {
        self.state.lock().route(envelope, sender, sender_role)
    }

    /// Remove a connection and tell everyone else it left.
    ///
    /// Returns `false` if `id` was not registered, in which case nothing is
    /// broadcast.
    pub fn on_close(&self, id: &ClientId) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.remove(id) else {
            return false;
        };
        let role = record.connection.role;
        let age = record.connection.age();
        let dropped = record.connection.drop_count();
        let departure = Envelope::new(EventKind::ClientDisconnected {
            client: record.connection.info(),
        })
        .with_source(role);
        let _ = state.broadcast_except(&departure, id);
        let total = state.clients.len();
        drop(state);

        info!(client_id = %id, %role, total, ?age, dropped, "client disconnected");
        metrics::counter_inc(metrics::DISCONNECTIONS_TOTAL);
        metrics::gauge_set(metrics::CONNECTIONS_ACTIVE, total);
        true
    }

    /// Record a probe answer from `id`.
    pub fn mark_alive(&self, id: &ClientId) {
        Self::mark_alive_locked(&mut self.state.lock(), id);
    }

    fn mark_alive_locked(state: &mut BrokerState, id: &ClientId) {
        if let Some(record) = state.clients.iter_mut().find(|r| &r.connection.id == id) {
            record.alive = true;
        }
    }

    /// One heartbeat pass.
    ///
    /// Connections that did not answer the previous probe are terminated
    /// and announced with `client_disconnected`; every other connection is
    /// marked not-alive and probed again. Returns the terminated ids.
    pub fn heartbeat_tick(&self) -> Vec<ClientId> {
        let mut state = self.state.lock();

        let dead: Vec<ClientId> = state
            .clients
            .iter()
            .filter(|r| !r.alive)
            .map(|r| r.connection.id.clone())
            .collect();

        for id in &dead {
            if let Some(record) = state.remove(id) {
                record.connection.terminate();
                let departure = Envelope::new(EventKind::ClientDisconnected {
                    client: record.connection.info(),
                })
                .with_source(record.connection.role);
                let _ = state.broadcast_except(&departure, id);
                info!(client_id = %id, role = %record.connection.role, "client missed heartbeat, terminated");
                metrics::counter_inc(metrics::HEARTBEAT_TERMINATIONS_TOTAL);
            }
        }

        for record in &mut state.clients {
            // A client whose buffer is full was never probed, so it keeps its flag.
            if record.connection.probe() {
                record.alive = false;
            } else {
                debug!(client_id = %record.connection.id, "probe not queued");
                metrics::counter_inc(metrics::SEND_DROPS_TOTAL);
            }
        }

        if !dead.is_empty() {
            metrics::gauge_set(metrics::CONNECTIONS_ACTIVE, state.clients.len());
        }
        dead
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Number of registered clients with `role`.
    pub fn count_by_role(&self, role: Role) -> usize {
        self.state
            .lock()
            .clients
            .iter()
            .filter(|r| r.connection.role == role)
            .count()
    }

    /// Roster of registered clients in registration order.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.state.lock().clients.iter().map(|r| r.connection.info()).collect()
    }

    /// Copy of the envelopes queued for `role`.
    pub fn queued(&self, role: Role) -> Vec<Envelope> {
        self.state.lock().queues.snapshot(role)
    }

    /// Number of envelopes queued for `role`.
    pub fn queue_len(&self, role: Role) -> usize {
        self.state.lock().queues.len(role)
    }

    /// Terminate every connection. Used on shutdown.
    pub fn terminate_all(&self) {
        for record in &self.state.lock().clients {
            record.connection.terminate();
        }
    }
}
