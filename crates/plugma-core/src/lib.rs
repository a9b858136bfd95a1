//! # plugma-core
//!
//! Protocol types shared by the relay broker and the client transport wrapper.
//!
//! - [`Role`]: declared category of a connecting context and its routing complement
//! - [`ClientId`] / [`ClientInfo`]: broker-assigned identity and roster entries
//! - [`Envelope`] / [`EventKind`]: the JSON wire envelope with a closed set of events
//! - [`TransportTag`] / [`Via`]: client-side transport selectors
//! - [`ReconnectPolicy`]: pluggable reconnect delay strategy

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod reconnect;
pub mod role;
pub mod transport;

pub use envelope::{Envelope, EventKind, WILDCARD_PLUGIN_ID};
pub use errors::ProtocolError;
pub use ids::{ClientId, ClientInfo};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectPolicy};
pub use role::Role;
pub use transport::{TransportTag, Via};
