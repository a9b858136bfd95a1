//! Transport wrapper configuration.

use std::sync::Arc;
use std::time::Duration;

use plugma_core::{ReconnectPolicy, Role};
use plugma_settings::ClientSettings;

use crate::errors::{ClientError, Result};
use crate::frames::{FrameTarget, WindowBus};

/// Everything needed to build a transport for one context.
#[derive(Clone)]
pub struct TransportOptions {
    /// Relay socket URL.
    pub url: String,
    /// Role this context declares.
    pub role: Role,
    /// When `false`, a socket-less stand-in is built instead.
    pub enable_web_socket: bool,
    /// Append `?source=<role>` to the URL.
    pub register_source: bool,
    /// Client heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Delay strategy between reconnect attempts.
    pub reconnect: Arc<dyn ReconnectPolicy>,
    /// Embedded frame this context posts into.
    pub iframe_target: Option<Arc<dyn FrameTarget>>,
    /// Enclosing frame, if any.
    pub parent: Option<Arc<dyn FrameTarget>>,
    /// This context's own message channel.
    pub window: Arc<WindowBus>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

impl TransportOptions {
    /// Build options from loaded settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            url: settings.url.clone(),
            role: settings.role,
            enable_web_socket: settings.enable_web_socket,
            register_source: settings.register_source,
            heartbeat_interval: settings.heartbeat_interval(),
            reconnect: Arc::new(settings.reconnect.to_policy()),
            iframe_target: None,
            parent: None,
            window: Arc::new(WindowBus::new()),
        }
    }

    /// Options for `role` dialing `url`, everything else default.
    pub fn new(url: impl Into<String>, role: Role) -> Self {
        Self {
            url: url.into(),
            role,
            ..Self::default()
        }
    }

    /// Set the embedded frame target.
    #[must_use]
    pub fn with_iframe(mut self, target: Arc<dyn FrameTarget>) -> Self {
        self.iframe_target = Some(target);
        self
    }

    /// Set the parent frame target.
    #[must_use]
    pub fn with_parent(mut self, target: Arc<dyn FrameTarget>) -> Self {
        self.parent = Some(target);
        self
    }

    /// Share an existing window bus.
    #[must_use]
    pub fn with_window(mut self, window: Arc<WindowBus>) -> Self {
        self.window = window;
        self
    }

    /// Replace the reconnect strategy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: impl ReconnectPolicy + 'static) -> Self {
        self.reconnect = Arc::new(policy);
        self
    }

    /// Set the client heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// The URL actually dialed.
    pub fn connect_url(&self) -> Result<String> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ClientError::InvalidUrl(self.url.clone()));
        }
        if !self.register_source {
            return Ok(self.url.clone());
        }
        let sep = if self.url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{sep}source={}", self.url, self.role))
    }
}
