//! `plugma-relay`: development relay broker.
//!
//! Serves the plugin UI at `/` and relays JSON envelopes between the
//! browser preview and the plugin window over `/ws`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use plugma_server::{BrokerConfig, RelayServer};
use plugma_settings::{RelaySettings, load_settings_from_path, settings_path};
use plugma_telemetry::{TelemetryConfig, init_subscriber};

#[derive(Parser, Debug)]
#[command(name = "plugma-relay", about = "Relay messages between plugin UI contexts")]
struct Cli {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (`0` picks a free port).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.plugma/relay.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTML file served at `/`.
    #[arg(long)]
    index: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `plugma_server=trace,info`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Skip the Prometheus recorder and the `/metrics` route.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(index) = &self.index {
            settings.server.index_path = index.display().to_string();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    init_subscriber(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
    });

    let config = BrokerConfig::from(&settings.server);
    let mut server = RelayServer::new(config);
    if !cli.no_metrics {
        match plugma_server::metrics::install_recorder() {
            Ok(handle) => server = server.with_metrics(handle),
            Err(err) => tracing::warn!(error = %err, "metrics recorder unavailable"),
        }
    }

    let handle = server.listen().await.context("Failed to bind relay")?;
    tracing::info!(addr = %handle.addr(), "relay listening on ws://{}/ws", handle.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "plugma-relay",
            "--host",
            "0.0.0.0",
            "--port",
            "4000",
            "--index",
            "web/ui.html",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.index_path, "web/ui.html");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_without_flags_keeps_settings() {
        let cli = Cli::parse_from(["plugma-relay"]);
        let mut settings = RelaySettings::default();
        let before = settings.server.port;
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, before);
        assert!(!cli.no_metrics);
    }
}
