//! Wire envelope and the closed set of relay events.
//!
//! ```text
//! { "pluginMessage": { "event": "<name>", ...fields }, "pluginId": "*", "source"?: "<role>" }
//! ```
//!
//! Known event names decode into typed [`EventKind`] variants. Anything else,
//! including a known name whose fields do not match, is kept verbatim as
//! [`EventKind::Opaque`] and forwarded unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::errors::{ProtocolError, Result};
use crate::ids::ClientInfo;
use crate::role::Role;

/// `pluginId` value carried by every relay envelope.
pub const WILDCARD_PLUGIN_ID: &str = "*";

const CLIENT_CONNECTED: &str = "client_connected";
const CLIENT_DISCONNECTED: &str = "client_disconnected";
const CLIENT_LIST: &str = "client_list";
const PING: &str = "ping";
const PONG: &str = "pong";

/// Contents of an envelope's `pluginMessage`.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// A client joined the relay.
    ClientConnected {
        /// The client that joined.
        client: ClientInfo,
    },
    /// A client left the relay or was terminated.
    ClientDisconnected {
        /// The client that left.
        client: ClientInfo,
    },
    /// Roster of every other registered client, sent on connect.
    ClientList {
        /// Other clients, in registration order.
        clients: Vec<ClientInfo>,
    },
    /// Liveness probe.
    Ping,
    /// Liveness probe answer.
    Pong,
    /// Application payload, forwarded untouched.
    Opaque(Value),
}

impl EventKind {
    /// Decode a `pluginMessage` value.
    pub fn from_value(value: Value) -> Self {
        let Some(event) = value.get("event").and_then(Value::as_str) else {
            return Self::Opaque(value);
        };
        let typed = match event {
            PING => Some(Self::Ping),
            PONG => Some(Self::Pong),
            CLIENT_CONNECTED => field::<ClientInfo>(&value, "client").map(|client| Self::ClientConnected { client }),
            CLIENT_DISCONNECTED => {
                field::<ClientInfo>(&value, "client").map(|client| Self::ClientDisconnected { client })
            }
            CLIENT_LIST => field::<Vec<ClientInfo>>(&value, "clients").map(|clients| Self::ClientList { clients }),
            _ => None,
        };
        typed.unwrap_or(Self::Opaque(value))
    }

    /// Encode back into a `pluginMessage` value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::ClientConnected { client } => json!({ "event": CLIENT_CONNECTED, "client": client }),
            Self::ClientDisconnected { client } => json!({ "event": CLIENT_DISCONNECTED, "client": client }),
            Self::ClientList { clients } => json!({ "event": CLIENT_LIST, "clients": clients }),
            Self::Ping => json!({ "event": PING }),
            Self::Pong => json!({ "event": PONG }),
            Self::Opaque(value) => value.clone(),
        }
    }

    /// The `event` string, if there is one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::ClientConnected { .. } => Some(CLIENT_CONNECTED),
            Self::ClientDisconnected { .. } => Some(CLIENT_DISCONNECTED),
            Self::ClientList { .. } => Some(CLIENT_LIST),
            Self::Ping => Some(PING),
            Self::Pong => Some(PONG),
            Self::Opaque(value) => value.get("event").and_then(Value::as_str),
        }
    }

    /// Topology and liveness signals. These are never queued.
    ///
    /// Decided by event name, so a malformed `client_connected` that fell
    /// through to `Opaque` is still transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.name(),
            Some(CLIENT_CONNECTED | CLIENT_DISCONNECTED | PING | PONG)
        )
    }

    fn is_absent(&self) -> bool {
        matches!(self, Self::Opaque(Value::Null))
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Opaque(Value::Null)
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

fn field<T: serde::de::DeserializeOwned>(value: &Value, key: &str) -> Option<T> {
    value
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn lenient_source<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Role>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).map(|s| Role::from_query(Some(s))))
}

fn wildcard() -> String {
    WILDCARD_PLUGIN_ID.to_owned()
}

/// A relay message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event payload.
    #[serde(rename = "pluginMessage", default, skip_serializing_if = "EventKind::is_absent")]
    pub plugin_message: EventKind,
    /// Always `"*"` for relay traffic.
    #[serde(rename = "pluginId", default = "wildcard")]
    pub plugin_id: String,
    /// Sender role, stamped by the broker when forwarding.
    ///
    /// A non-string value from a client reads as `None`.
    #[serde(default, deserialize_with = "lenient_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<Role>,
    /// Any other top-level fields, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Wrap an event in a fresh envelope.
    pub fn new(event: EventKind) -> Self {
        Self {
            plugin_message: event,
            plugin_id: wildcard(),
            source: None,
            extra: Map::new(),
        }
    }

    /// Replace the `source` field.
    #[must_use]
    pub fn with_source(mut self, source: Role) -> Self {
        self.source = Some(source);
        self
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_json(value: Value) -> Result<Self> {
        let kind = match &value {
            Value::Object(_) => return Ok(serde_json::from_value(value)?),
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
        };
        Err(ProtocolError::NotAnObject(kind))
    }

    /// Encode as a text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode as a JSON value.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Shorthand for the event kind.
    pub fn event(&self) -> &EventKind {
        &self.plugin_message
    }
}
