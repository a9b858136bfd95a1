//! Broker-wide liveness monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broker::Broker;

/// Run heartbeat ticks until `cancel` fires.
///
/// Each tick terminates connections that did not answer the previous probe
/// and probes the rest, so a silent client is gone within two intervals.
/// Returns the number of connections terminated.
pub async fn run_heartbeat(broker: Arc<Broker>, interval: Duration, cancel: CancellationToken) -> usize {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    let _ = ticker.tick().await;

    let mut terminated = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let dead = broker.heartbeat_tick();
                if !dead.is_empty() {
                    debug!(count = dead.len(), "heartbeat terminated silent clients");
                }
                terminated += dead.len();
            }
            () = cancel.cancelled() => {
                debug!(terminated, "heartbeat monitor stopped");
                return terminated;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::connection::Outbound;
    use plugma_core::Role;

    fn broker() -> Arc<Broker> {
        Arc::new(Broker::new(BrokerConfig::default()))
    }

    #[tokio::test]
    async fn cancelled_before_first_interval() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let terminated = run_heartbeat(broker(), Duration::from_secs(100), cancel).await;
        assert_eq!(terminated, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_terminated_within_two_intervals() {
        let broker = broker();
        let silent = broker.on_connect(Role::Browser);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_heartbeat(Arc::clone(&broker), Duration::from_millis(100), cancel.clone()));

        time::sleep(Duration::from_millis(250)).await;
        assert!(silent.terminate.is_cancelled());
        assert_eq!(broker.client_count(), 0);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn responsive_client_survives() {
        let broker = broker();
        let mut reg = broker.on_connect(Role::PluginWindow);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_heartbeat(Arc::clone(&broker), Duration::from_millis(100), cancel.clone()));

        // Answer every probe as it arrives.
        let mut probes = 0;
        while probes < 5 {
            if let Some(Outbound::Probe) = reg.rx.recv().await {
                broker.mark_alive(&reg.id);
                probes += 1;
            }
        }

        assert!(!reg.terminate.is_cancelled());
        assert_eq!(broker.client_count(), 1);
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 0);
    }
}
