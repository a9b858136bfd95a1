//! `/health` endpoint body.

use serde::Serialize;
use std::time::Instant;

use crate::broker::Broker;
use plugma_core::Role;

/// Per-role counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    /// `browser` count.
    pub browser: usize,
    /// `plugin-window` count.
    pub plugin_window: usize,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered connection count, all roles.
    pub connections: usize,
    /// Live `browser` clients.
    pub browser: usize,
    /// Live `plugin-window` clients.
    pub plugin_window: usize,
    /// Envelopes waiting per role.
    pub queued: RoleCounts,
}

/// Build a health response from the broker's live counters.
pub fn health_check(start_time: Instant, broker: &Broker) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: broker.client_count(),
        browser: broker.count_by_role(Role::Browser),
        plugin_window: broker.count_by_role(Role::PluginWindow),
        queued: RoleCounts {
            browser: broker.queue_len(Role::Browser),
            plugin_window: broker.queue_len(Role::PluginWindow),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;

    #[test]
    fn empty_broker() {
        let broker = Broker::new(BrokerConfig::default());
        let resp = health_check(Instant::now(), &broker);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.queued, RoleCounts::default());
    }

    #[test]
    fn uptime_increases() {
        let broker = Broker::new(BrokerConfig::default());
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, &broker).uptime_secs >= 59);
    }

    #[test]
    fn counts_roles_and_queues() {
        let broker = Broker::new(BrokerConfig::default());
        let a = broker.on_connect(Role::Browser);
        let _u = broker.on_connect(Role::Unknown);
        let _ = broker.on_message(&a.id, r#"{"pluginMessage":{"event":"custom"}}"#);

        let resp = health_check(Instant::now(), &broker);
        assert_eq!(resp.connections, 2);
        assert_eq!(resp.browser, 1);
        assert_eq!(resp.plugin_window, 0);
        assert_eq!(resp.queued.plugin_window, 1);
    }

    #[test]
    fn serialization_is_camel_case() {
        let broker = Broker::new(BrokerConfig::default());
        let json = serde_json::to_value(health_check(Instant::now(), &broker)).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptimeSecs"].is_number());
        assert_eq!(json["pluginWindow"], 0);
        assert_eq!(json["queued"]["pluginWindow"], 0);
    }
}
