//! Prometheus metrics recorder and the broker's metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another global
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

pub(crate) fn counter_inc(name: &'static str) {
    ::metrics::counter!(name).increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn gauge_set(name: &'static str, value: usize) {
    ::metrics::gauge!(name).set(value as f64);
}

/// WebSocket connections opened total (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// WebSocket disconnections total (counter).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Envelopes delivered to at least one live client (counter).
pub const MESSAGES_ROUTED_TOTAL: &str = "relay_messages_routed_total";
/// Envelopes appended to a role queue (counter).
pub const MESSAGES_QUEUED_TOTAL: &str = "relay_messages_queued_total";
/// Envelopes discarded with no live target (counter).
pub const MESSAGES_DROPPED_TOTAL: &str = "relay_messages_dropped_total";
/// Inbound frames that were not a JSON object (counter).
pub const MESSAGES_MALFORMED_TOTAL: &str = "relay_messages_malformed_total";
/// Frames dropped because a client's send buffer was full (counter).
pub const SEND_DROPS_TOTAL: &str = "relay_send_drops_total";
/// Connections terminated for missing a heartbeat (counter).
pub const HEARTBEAT_TERMINATIONS_TOTAL: &str = "relay_heartbeat_terminations_total";
