//! Client identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;

/// Opaque, broker-assigned client identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh unique id.
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// Wrap an id received over the wire.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Roster entry as carried by `client_list`, `client_connected` and
/// `client_disconnected` events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client id.
    pub id: ClientId,
    /// Declared role of the client.
    pub source: Role,
}

impl ClientInfo {
    /// Build a roster entry.
    pub fn new(id: ClientId, source: Role) -> Self {
        Self { id, source }
    }
}
