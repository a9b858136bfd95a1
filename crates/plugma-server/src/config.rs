//! Broker configuration.

use std::path::PathBuf;
use std::time::Duration;

use plugma_settings::ServerSettings;

/// Runtime configuration for the broker and its HTTP listener.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Interval between liveness probes.
    pub heartbeat_interval: Duration,
    /// Outgoing frames buffered per connection.
    pub max_send_queue: usize,
    /// Envelopes held per role while no client of that role is live.
    pub max_queued_per_role: usize,
    /// HTML file served at `/`.
    pub index_path: PathBuf,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval: Duration::from_secs(10),
            max_send_queue: 256,
            max_queued_per_role: 1000,
            index_path: PathBuf::from("dist/ui.html"),
            max_message_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl From<&ServerSettings> for BrokerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval: settings.heartbeat_interval(),
            max_send_queue: settings.max_send_queue,
            max_queued_per_role: settings.max_queued_per_role,
            index_path: PathBuf::from(&settings.index_path),
            ..Self::default()
        }
    }
}
