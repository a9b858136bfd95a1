//! `RelayServer`: axum HTTP + `WebSocket` front end for the [`Broker`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use plugma_core::Role;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::heartbeat;
use crate::metrics;
use crate::shutdown::{DEFAULT_SHUTDOWN_TIMEOUT, ShutdownCoordinator};
use crate::websocket;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The broker.
    pub broker: Arc<Broker>,
    /// Cancelled on server shutdown.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// HTML file served at `/`.
    pub index_path: Arc<PathBuf>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Max inbound `WebSocket` message size.
    pub max_message_size: usize,
}

#[derive(Debug, Default, Deserialize)]
struct WsParams {
    source: Option<String>,
}

/// The relay server.
pub struct RelayServer {
    config: BrokerConfig,
    broker: Arc<Broker>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server with a fresh broker.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            broker: Arc::new(Broker::new(config.clone())),
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            broker: Arc::clone(&self.broker),
            shutdown: self.shutdown.token(),
            start_time: self.start_time,
            index_path: Arc::new(self.config.index_path.clone()),
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", get(index_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// The broker behind this server.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Bind, then serve HTTP and run the heartbeat monitor in the background.
    pub async fn listen(self) -> Result<ServerHandle> {
        if self.config.heartbeat_interval.is_zero() {
            return Err(ServerError::ZeroHeartbeat);
        }
        let host = self.config.host.as_str();
        let addr = tokio::net::lookup_host((host, self.config.port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ServerError::InvalidAddress(format!("{host}:{}", self.config.port)))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        self.shutdown.track(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "http server exited with error");
            }
        }));

        let broker = Arc::clone(&self.broker);
        let interval = self.config.heartbeat_interval;
        let token = self.shutdown.token();
        self.shutdown.track(tokio::spawn(async move {
            let _ = heartbeat::run_heartbeat(broker, interval, token).await;
        }));

        info!(
            addr = %local_addr,
            heartbeat_ms = interval.as_millis(),
            index = %self.config.index_path.display(),
            "relay server listening"
        );

        Ok(ServerHandle {
            addr: local_addr,
            broker: self.broker,
            shutdown: self.shutdown,
        })
    }
}

/// Handle to a listening server.
pub struct ServerHandle {
    addr: SocketAddr,
    broker: Arc<Broker>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `WebSocket` URL a client of `role` should dial.
    pub fn ws_url(&self, role: Role) -> String {
        format!("ws://{}/ws?source={role}", self.addr)
    }

    /// The broker behind this server.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Token cancelled when shutdown starts.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Close every socket, stop the listener and the heartbeat monitor.
    pub async fn shutdown(self) {
        info!(clients = self.broker.client_count(), "relay server shutting down");
        self.shutdown.graceful_shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await;
        self.broker.terminate_all();
    }
}

/// GET /
async fn index_handler(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(state.index_path.as_ref()).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %state.index_path.display(), error = %e, "index asset unavailable");
            (StatusCode::NOT_FOUND, "index asset not found").into_response()
        }
    }
}

/// GET /ws?source=<role>
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let role = Role::from_query(params.source.as_deref());
    debug!(%role, "websocket upgrade");
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = websocket::handle_socket(socket, role, state.broker, state.shutdown).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, &state.broker))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
