//! # plugma-client
//!
//! Transport wrapper for one execution context.
//!
//! - [`Messenger`]: uniform `post`/`on` over `iframe`, `parent`, `window` and `ws`
//! - [`RelayTransport`]: reconnecting relay socket with an outbound queue,
//!   one-shot `open`/`close` observers, role rosters and the client heartbeat
//! - [`DisabledTransport`]: local-only stand-in when the socket is off
//! - [`setup_transport`]: picks one of the two from [`TransportOptions`]

#![deny(unsafe_code)]

pub mod disabled;
pub mod errors;
pub mod frames;
mod local;
pub mod messenger;
pub mod observer;
pub mod options;
pub mod relay;
pub mod roster;
pub mod socket;

pub use disabled::DisabledTransport;
pub use errors::ClientError;
pub use frames::{FrameSource, FrameTarget, Listener, MessageEvent, Payload, WindowBus};
pub use messenger::{Messenger, setup_transport};
pub use observer::{Callback, ListenerId};
pub use options::TransportOptions;
pub use relay::RelayTransport;
pub use roster::RemoteClients;
pub use socket::{ConnectionState, QueuedMessage};
