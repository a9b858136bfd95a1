//! Typed settings for the broker, the client transport and logging.

use std::time::Duration;

use plugma_core::{ExponentialBackoff, Role};
use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Broker settings.
    pub server: ServerSettings,
    /// Client transport settings.
    pub client: ClientSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Broker network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Interval between liveness probes in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Outgoing frames buffered per connection before sends are dropped.
    pub max_send_queue: usize,
    /// Envelopes held per role while no client of that role is connected.
    pub max_queued_per_role: usize,
    /// HTML file served at `/`.
    pub index_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
            heartbeat_interval_ms: 10_000,
            max_send_queue: 256,
            max_queued_per_role: 1000,
            index_path: "dist/ui.html".to_string(),
        }
    }
}

impl ServerSettings {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Client transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Relay socket endpoint.
    pub url: String,
    /// When `false`, the socket transport is replaced by a local-only stand-in.
    pub enable_web_socket: bool,
    /// Append `?source=<role>` to the endpoint.
    pub register_source: bool,
    /// Role this context declares.
    pub role: Role,
    /// Client-side heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Reconnect backoff.
    pub reconnect: ReconnectSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9001/ws".to_string(),
            enable_web_socket: true,
            register_source: true,
            role: Role::Unknown,
            heartbeat_interval_ms: 10_000,
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl ClientSettings {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Exponential reconnect backoff parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Maximum delay between retries.
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the capped delay.
    pub jitter_factor: f64,
    /// Stop retrying after this many attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter_factor: 0.3,
            max_attempts: None,
        }
    }
}

impl ReconnectSettings {
    /// Build the backoff policy these settings describe.
    pub fn to_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_factor: self.jitter_factor,
            max_attempts: self.max_attempts,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
