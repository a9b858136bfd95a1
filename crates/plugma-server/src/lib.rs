//! # plugma-server
//!
//! The relay broker.
//!
//! - [`Broker`]: client registry, role-complement routing, per-role queues, heartbeat ticks
//! - `WebSocket` gateway at `/ws?source=<role>`, index asset at `/`, `/health`, `/metrics`
//! - Heartbeat monitor task that probes every connection and terminates silent ones
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod broker;
pub mod config;
pub mod connection;
pub mod errors;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use broker::{Broker, Registration, RouteOutcome};
pub use config::BrokerConfig;
pub use errors::ServerError;
pub use server::{RelayServer, ServerHandle};
