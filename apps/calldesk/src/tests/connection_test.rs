use std::sync::Arc;
use std::time::Duration;

use call_protocol::{CallEvent, EventKind};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};

use crate::connection::{
    ConnectionManager, ConnectionStatus, LinkPeer, MemoryConnector, ReconnectPolicy, Signal,
    SignalHandler, SignalKind,
};

const URL: &str = "ws://127.0.0.1:8000/ws/calls";

fn manager(connector: &Arc<MemoryConnector>) -> ConnectionManager {
    ConnectionManager::new(connector.clone(), URL, ReconnectPolicy::default())
}

fn record_signals(manager: &ConnectionManager) -> Arc<Mutex<Vec<Signal>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = SignalHandler::new(move |signal: &Signal| sink.lock().push(signal.clone()));
    for kind in SignalKind::all() {
        manager.subscribe(kind, handler.clone());
    }
    seen
}

fn count(seen: &Mutex<Vec<Signal>>, kind: SignalKind) -> usize {
    seen.lock().iter().filter(|s| s.kind() == kind).count()
}

async fn next_peer(peers: &mut mpsc::UnboundedReceiver<LinkPeer>) -> LinkPeer {
    timeout(Duration::from_secs(60), peers.recv())
        .await
        .expect("connector was not asked for a link")
        .expect("connector dropped")
}

async fn wait_status(status: &mut watch::Receiver<ConnectionStatus>, want: ConnectionStatus) {
    timeout(Duration::from_secs(60), status.wait_for(|s| *s == want))
        .await
        .expect("status did not change in time")
        .expect("manager dropped");
}

async fn next_frame(peer: &mut LinkPeer) -> Value {
    let text = timeout(Duration::from_secs(60), peer.from_client.recv())
        .await
        .expect("no frame from client")
        .expect("link closed");
    serde_json::from_str(&text).expect("client frames are json")
}

#[tokio::test]
async fn open_announces_frontend_ready() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let seen = record_signals(&manager);
    let mut status = manager.watch_status();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    manager.connect(None);
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    let mut peer = next_peer(&mut peers).await;
    let frame = next_frame(&mut peer).await;
    assert_eq!(frame["type"], "frontend_ready");

    wait_status(&mut status, ConnectionStatus::Connected).await;
    assert!(manager.is_connected());
    assert_eq!(count(&seen, SignalKind::Connected), 1);
    assert_eq!(connector.attempted_urls(), vec![URL.to_string()]);
}

#[tokio::test]
async fn events_dispatch_by_kind_and_bad_frames_are_dropped() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let (tx, mut rx) = mpsc::unbounded_channel();
    manager.on(SignalKind::Event(EventKind::NewCall), move |signal| {
        if let Signal::Event(event) = signal {
            let _ = tx.send(event.clone());
        }
    });
    let ends = Arc::new(Mutex::new(0));
    let ends_sink = ends.clone();
    manager.on(SignalKind::Event(EventKind::CallEnd), move |_| {
        *ends_sink.lock() += 1;
    });

    manager.connect(None);
    let peer = next_peer(&mut peers).await;
    assert!(peer.push("{not json"));
    assert!(peer.push(r#"{"type":"call_recording_ready","data":{}}"#));
    assert!(peer.push(r#"{"type":"call_status_update","data":{"status":"completed"}}"#));
    assert!(peer.push(
        json!({"type": "new_call", "data": {"user_phone": "+1-555-0100", "summary": "Feeling low"}})
            .to_string()
    ));

    let event = timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("new_call was not dispatched")
        .expect("handler dropped");
    match event {
        CallEvent::NewCall(call) => assert_eq!(call.phone, "+1-555-0100"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(*ends.lock(), 0);
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test]
async fn connect_is_a_no_op_while_active() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let mut status = manager.watch_status();

    manager.connect(None);
    manager.connect(None);
    let _peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;
    manager.connect(Some("ws://127.0.0.1:9999/elsewhere"));

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(manager.endpoint(), URL);
}

#[tokio::test(start_paused = true)]
async fn reconnect_backoff_is_linear_and_bounded() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let seen = record_signals(&manager);
    let mut status = manager.watch_status();

    manager.connect(None);
    let peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;

    connector.refuse_all(true);
    let dropped_at = Instant::now();
    drop(peer);
    sleep(Duration::from_secs(30)).await;

    let times = connector.attempt_times();
    assert_eq!(times.len(), 6);
    let offsets: Vec<u128> = times[1..]
        .iter()
        .map(|at| (*at - dropped_at).as_millis())
        .collect();
    assert_eq!(offsets, vec![1000, 3000, 6000, 10000, 15000]);

    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(manager.reconnect_attempts(), 5);
    assert_eq!(count(&seen, SignalKind::Disconnected), 6);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempt_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn successful_reopen_resets_attempt_budget() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let mut status = manager.watch_status();

    manager.connect(None);
    let peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;

    connector.script([false, false, true]);
    drop(peer);
    let mut peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(connector.attempt_count(), 4);
    assert_eq!(next_frame(&mut peer).await["type"], "frontend_ready");
}

#[tokio::test(start_paused = true)]
async fn deliberate_disconnect_does_not_reconnect() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let seen = record_signals(&manager);
    let mut status = manager.watch_status();

    manager.connect(None);
    let mut peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(next_frame(&mut peer).await["type"], "frontend_ready");

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(count(&seen, SignalKind::Disconnected), 1);
    assert!(peer.from_client.recv().await.is_none());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(count(&seen, SignalKind::Disconnected), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_replaces_pending_reconnect() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let mut status = manager.watch_status();

    manager.connect(None);
    let peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;

    drop(peer);
    wait_status(&mut status, ConnectionStatus::Disconnected).await;
    let reconnected_at = Instant::now();
    manager.connect(None);
    let _peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;

    sleep(Duration::from_secs(10)).await;
    let times = connector.attempt_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1], reconnected_at);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn send_requires_an_open_link() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let mut status = manager.watch_status();
    assert!(!manager.send_event("diagnostic", json!({"sample": 1})));

    manager.connect(None);
    let mut peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(next_frame(&mut peer).await["type"], "frontend_ready");

    assert!(manager.send_event("diagnostic", json!({"sample": 2})));
    assert_eq!(
        next_frame(&mut peer).await,
        json!({"type": "diagnostic", "data": {"sample": 2}})
    );
}

#[tokio::test]
async fn off_removes_only_the_given_handler() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let hits = Arc::new(Mutex::new(Vec::new()));
    let first_hits = hits.clone();
    let first = manager.on(SignalKind::Connected, move |_| first_hits.lock().push("first"));
    let second_hits = hits.clone();
    manager.on(SignalKind::Connected, move |_| second_hits.lock().push("second"));

    assert!(manager.off(SignalKind::Connected, &first));
    assert!(!manager.off(SignalKind::Connected, &first));
    assert_eq!(manager.handler_count(SignalKind::Connected), 1);

    let mut status = manager.watch_status();
    manager.connect(None);
    let _peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;
    assert_eq!(*hits.lock(), vec!["second"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_timer_and_clears_handlers() {
    let (connector, mut peers) = MemoryConnector::new();
    let manager = manager(&connector);
    let seen = record_signals(&manager);
    let mut status = manager.watch_status();

    manager.connect(None);
    let peer = next_peer(&mut peers).await;
    wait_status(&mut status, ConnectionStatus::Connected).await;
    drop(peer);
    wait_status(&mut status, ConnectionStatus::Disconnected).await;

    manager.shutdown();
    assert_eq!(manager.handler_count(SignalKind::Connected), 0);
    assert_eq!(manager.handler_count(SignalKind::Disconnected), 0);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(count(&seen, SignalKind::Connected), 1);
}
