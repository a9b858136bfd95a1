//! Transport wrapper against a real relay broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use plugma_client::{
    ConnectionState, FrameSource, Listener, MessageEvent, Messenger, RelayTransport, TransportOptions,
};
use plugma_core::{FixedDelay, Role, TransportTag, Via};
use plugma_server::{BrokerConfig, RelayServer, ServerHandle};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(port: u16) -> ServerHandle {
    RelayServer::new(BrokerConfig {
        port,
        ..BrokerConfig::default()
    })
    .listen()
    .await
    .unwrap()
}

fn options(server_port: u16, role: Role) -> TransportOptions {
    TransportOptions::new(format!("ws://127.0.0.1:{server_port}/ws"), role)
        .with_reconnect(FixedDelay(Duration::from_millis(50)))
}

async fn open(transport: &RelayTransport) {
    let mut state = transport.state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Open))
        .await
        .expect("socket did not open")
        .unwrap();
}

fn collector() -> (Listener, mpsc::UnboundedReceiver<MessageEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Listener = Arc::new(move |event: &MessageEvent| {
        let _ = tx.send(event.clone());
    });
    (listener, rx)
}

/// Next event whose `pluginMessage.event` equals `name`.
async fn next_event(rx: &mut mpsc::UnboundedReceiver<MessageEvent>, name: &str) -> Value {
    timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("listener channel closed");
            if let Some(value) = event.data.as_json() {
                if value["pluginMessage"]["event"] == name {
                    return value.clone();
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

fn custom(n: i64) -> Value {
    json!({"pluginMessage": {"event": "custom", "value": n}, "pluginId": "*"})
}

#[tokio::test]
async fn browser_and_plugin_window_exchange_messages() {
    let server = start_server(0).await;
    let browser = RelayTransport::connect(options(server.port(), Role::Browser)).unwrap();
    let plugin = RelayTransport::connect(options(server.port(), Role::PluginWindow)).unwrap();
    open(&browser).await;
    open(&plugin).await;

    let (listener, mut inbox) = collector();
    let _ = plugin.on(listener, Via::default());

    browser.post(custom(1), Via::default());
    let got = next_event(&mut inbox, "custom").await;
    assert_eq!(got["source"], "browser");
    assert_eq!(got["pluginMessage"]["value"], 1);

    let mut roster = browser.remote_clients();
    timeout(WAIT, roster.wait_for(|r| r.plugin_window.len() == 1))
        .await
        .unwrap()
        .unwrap();
    assert!(browser.is_connected());

    server.shutdown().await;
}

#[tokio::test]
async fn socket_payloads_fan_out_to_window_listeners() {
    let server = start_server(0).await;
    let browser = RelayTransport::connect(options(server.port(), Role::Browser)).unwrap();
    let plugin = RelayTransport::connect(options(server.port(), Role::PluginWindow)).unwrap();
    open(&browser).await;
    open(&plugin).await;

    let (listener, mut inbox) = collector();
    let _ = plugin.on(listener, Via::from(TransportTag::Window));

    browser.post(custom(2), Via::default());
    let got = next_event(&mut inbox, "custom").await;
    assert_eq!(got["pluginMessage"]["value"], 2);

    server.shutdown().await;
}

#[tokio::test]
async fn posts_made_before_the_broker_exists_are_flushed_in_order() {
    // Reserve a port, then free it so the first dials fail.
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let browser = RelayTransport::connect(options(port, Role::Browser)).unwrap();
    browser.post(custom(1), Via::default());
    browser.post(custom(2), Via::default());
    assert_eq!(browser.queued().len(), 2);
    assert!(!browser.is_connected());

    let server = start_server(port).await;
    open(&browser).await;
    assert!(browser.queued().is_empty());

    let plugin = RelayTransport::connect(options(port, Role::PluginWindow)).unwrap();
    let (listener, mut inbox) = collector();
    let _ = plugin.on(listener, Via::default());
    open(&plugin).await;

    let first = next_event(&mut inbox, "custom").await;
    let second = next_event(&mut inbox, "custom").await;
    assert_eq!(first["pluginMessage"]["value"], 1);
    assert_eq!(second["pluginMessage"]["value"], 2);

    server.shutdown().await;
}

#[tokio::test]
async fn plugin_window_pings_and_browser_answers() {
    let server = start_server(0).await;
    let browser = RelayTransport::connect(options(server.port(), Role::Browser)).unwrap();
    let plugin = RelayTransport::connect(
        options(server.port(), Role::PluginWindow).with_heartbeat_interval(Duration::from_millis(100)),
    )
    .unwrap();

    let (browser_listener, mut browser_inbox) = collector();
    let _ = browser.on(browser_listener, Via::default());
    let (plugin_listener, mut plugin_inbox) = collector();
    let _ = plugin.on(plugin_listener, Via::default());
    open(&browser).await;
    open(&plugin).await;

    let ping = next_event(&mut browser_inbox, "ping").await;
    assert_eq!(ping["source"], "plugin-window");
    let pong = next_event(&mut plugin_inbox, "pong").await;
    assert_eq!(pong["source"], "browser");

    server.shutdown().await;
}

#[tokio::test]
async fn close_runs_callback_and_peer_roster_drops_the_client() {
    let server = start_server(0).await;
    let browser = RelayTransport::connect(options(server.port(), Role::Browser)).unwrap();
    let plugin = RelayTransport::connect(options(server.port(), Role::PluginWindow)).unwrap();
    open(&browser).await;
    open(&plugin).await;

    let mut roster = browser.remote_clients();
    timeout(WAIT, roster.wait_for(|r| r.plugin_window.len() == 1))
        .await
        .unwrap()
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = plugin.close(Some(Box::new(move || {
        let _ = tx.send(());
    })));
    timeout(WAIT, rx).await.unwrap().unwrap();
    assert!(!plugin.is_connected());

    timeout(WAIT, roster.wait_for(|r| r.plugin_window.is_empty()))
        .await
        .unwrap()
        .unwrap();

    // A closed transport does not come back.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(plugin.connection_state(), ConnectionState::Disconnected);

    server.shutdown().await;
}

#[tokio::test]
async fn open_callback_runs_after_connect_and_immediately_afterwards() {
    let server = start_server(0).await;
    let browser = RelayTransport::connect(options(server.port(), Role::Browser)).unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = browser.open(Box::new(move || {
        let _ = tx.send(());
    }));
    timeout(WAIT, rx).await.unwrap().unwrap();

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    assert!(browser.open(Box::new(move || {
        let _ = tx.send(());
    })).is_none());
    assert!(rx.try_recv().is_ok());

    server.shutdown().await;
}

#[tokio::test]
async fn window_posts_stay_local() {
    let server = start_server(0).await;
    let browser = RelayTransport::connect(options(server.port(), Role::Browser)).unwrap();

    let (listener, mut inbox) = collector();
    let _ = browser.on(listener, Via::from(TransportTag::Window));
    browser.post(json!({"pluginMessage": {"event": "local"}}), Via::from(TransportTag::Window));

    let event = timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(event.source, FrameSource::Window);
    assert!(browser.queued().is_empty());

    server.shutdown().await;
}

/// Rebind `port` once the previous listener has let go of it.
async fn restart_server(port: u16) -> ServerHandle {
    timeout(WAIT, async {
        loop {
            let server = RelayServer::new(BrokerConfig {
                port,
                ..BrokerConfig::default()
            });
            match server.listen().await {
                Ok(handle) => return handle,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("port was not released")
}

#[tokio::test]
async fn open_socket_survives_a_broker_restart() {
    let server = start_server(0).await;
    let port = server.port();
    let browser = RelayTransport::connect(options(port, Role::Browser)).unwrap();
    let plugin = RelayTransport::connect(options(port, Role::PluginWindow)).unwrap();
    let (listener, mut inbox) = collector();
    let _ = plugin.on(listener, Via::default());
    open(&browser).await;
    open(&plugin).await;

    let mut roster = browser.remote_clients();
    timeout(WAIT, roster.wait_for(|r| r.plugin_window.len() == 1))
        .await
        .unwrap()
        .unwrap();
    let old_peer = roster.borrow().plugin_window[0].id.clone();

    let drops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&drops);
    assert!(browser
        .on_closed(Box::new(move || {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        }))
        .is_some());

    let mut connected = browser.connected();
    assert!(*connected.borrow());
    server.shutdown().await;
    timeout(WAIT, connected.wait_for(|c| !*c)).await.unwrap().unwrap();

    // Posts made while the broker is down wait in the outbound queue.
    browser.post(custom(1), Via::default());
    browser.post(custom(2), Via::default());
    assert_eq!(browser.queued().len(), 2);

    let (reopened_tx, reopened_rx) = tokio::sync::oneshot::channel();
    assert!(browser
        .open(Box::new(move || {
            let _ = reopened_tx.send(());
        }))
        .is_some());

    let server = restart_server(port).await;
    timeout(WAIT, reopened_rx).await.unwrap().unwrap();
    timeout(WAIT, connected.wait_for(|c| *c)).await.unwrap().unwrap();
    assert!(browser.queued().is_empty());

    let first = next_event(&mut inbox, "custom").await;
    let second = next_event(&mut inbox, "custom").await;
    assert_eq!(first["pluginMessage"]["value"], 1);
    assert_eq!(second["pluginMessage"]["value"], 2);
    assert_eq!(first["source"], "browser");

    // The new broker's roster replaces the stale entry.
    timeout(
        WAIT,
        roster.wait_for(|r| r.plugin_window.len() == 1 && r.plugin_window[0].id != old_peer),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(browser.connection_state(), ConnectionState::Open);

    server.shutdown().await;
}
