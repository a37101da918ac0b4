//! Integration tests for the connection manager against a real loopback
//! WebSocket server.
//!
//! Each test binds an ephemeral listener, accepts one WebSocket session, and
//! plays the device's side of the conversation.  Keepalive intervals are
//! shortened so cadence is observable without slow tests.

use std::net::IpAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use dwarflink_client::application::CameraController;
use dwarflink_client::infrastructure::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
};
use dwarflink_core::protocol::envelope::{decode_frame, encode_frame};
use dwarflink_core::protocol::modules::{CameraKind, KEEPALIVE_CMD, KEEPALIVE_MODULE};
use dwarflink_core::CamParams;

const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

/// Fake device: accepts one WebSocket session, forwards every inbound binary
/// message to `inbound_tx`, and writes every message from `outbound_rx` to
/// the client.  Dropping the outbound sender kills the TCP connection
/// without a close handshake, simulating a transport failure.
async fn spawn_device(
) -> (u16, mpsc::UnboundedReceiver<Vec<u8>>, mpsc::UnboundedSender<Message>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().unwrap().port();
    let (inbound_rx, outbound_tx) = spawn_device_on(listener);
    (port, inbound_rx, outbound_tx)
}

fn spawn_device_on(
    listener: TcpListener,
) -> (mpsc::UnboundedReceiver<Vec<u8>>, mpsc::UnboundedSender<Message>) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let (mut sink, mut source) = ws.split();

        loop {
            tokio::select! {
                msg = source.next() => match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        if inbound_tx.send(bytes).is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                msg = outbound_rx.recv() => match msg {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    (inbound_rx, outbound_tx)
}

fn config(port: u16, keepalive: Duration) -> ConnectionConfig {
    ConnectionConfig {
        control_port: port,
        keepalive_interval: keepalive,
    }
}

async fn expect_connected(rx: &mut mpsc::Receiver<ConnectionEvent>) -> String {
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(ConnectionEvent::Connected { session_id })) => session_id,
        other => panic!("expected Connected event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_emits_connected_with_session_id() {
    let (port, _inbound, _outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");

    let session_id = expect_connected(&mut rx).await;
    assert!(!session_id.is_empty());
    assert_eq!(mgr.state().await, ConnectionState::Connected);

    mgr.disconnect().await;
}

#[tokio::test]
async fn test_outbound_frames_carry_the_session_id() {
    let (port, mut inbound, _outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    let session_id = expect_connected(&mut rx).await;

    mgr.send(6, 14002, &[0, 0, 0, 1]).await.expect("send");

    let bytes = timeout(Duration::from_secs(2), inbound.recv())
        .await
        .expect("frame within deadline")
        .expect("frame");
    let (frame, consumed) = decode_frame(&bytes).expect("decode");
    assert_eq!(consumed, bytes.len());
    assert_eq!(frame.module, 6);
    assert_eq!(frame.cmd, 14002);
    assert_eq!(frame.session_id, session_id);
    assert_eq!(frame.payload, vec![0, 0, 0, 1]);

    mgr.disconnect().await;
}

#[tokio::test]
async fn test_keepalive_frames_arrive_at_the_configured_cadence() {
    let (port, mut inbound, _outbound) = spawn_device().await;
    let keepalive = Duration::from_millis(100);
    let (mgr, mut rx) = ConnectionManager::new(config(port, keepalive));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    // Over ~3.5 intervals at least two keepalives must land.
    let mut keepalives = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(350);
    while let Ok(Some(bytes)) = timeout_at_or_err(deadline, inbound.recv()).await {
        let (frame, _) = decode_frame(&bytes).expect("decode");
        if frame.module == KEEPALIVE_MODULE && frame.cmd == KEEPALIVE_CMD {
            assert!(frame.payload.is_empty(), "keepalive payload must be empty");
            keepalives += 1;
        }
    }
    assert!(keepalives >= 2, "expected >=2 keepalives, got {keepalives}");

    mgr.disconnect().await;
}

async fn timeout_at_or_err<F: std::future::Future>(
    deadline: tokio::time::Instant,
    fut: F,
) -> Result<F::Output, tokio::time::error::Elapsed> {
    tokio::time::timeout_at(deadline, fut).await
}

#[tokio::test]
async fn test_malformed_inbound_frame_does_not_kill_the_session() {
    let (port, _inbound, outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    // Garbage first, then a valid frame.  Only the valid one may surface.
    outbound
        .send(Message::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .unwrap();
    outbound
        .send(Message::Binary(encode_frame(9, 1, &[0x55], "dev-session")))
        .unwrap();

    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(ConnectionEvent::MessageReceived {
            module,
            cmd,
            payload,
        })) => {
            assert_eq!(module, 9);
            assert_eq!(cmd, 1);
            assert_eq!(payload, vec![0x55]);
        }
        other => panic!("expected MessageReceived, got {other:?}"),
    }
    assert_eq!(mgr.state().await, ConnectionState::Connected);

    mgr.disconnect().await;
}

#[tokio::test]
async fn test_remote_close_emits_disconnected_without_error() {
    let (port, _inbound, outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    outbound.send(Message::Close(None)).unwrap();

    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(ConnectionEvent::Disconnected)) => {}
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(mgr.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_is_idempotent_while_connected() {
    let (port, _inbound, _outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    // Second connect is a no-op: no state change, no second Connected event.
    mgr.connect(LOCALHOST).await.expect("second connect");
    assert_eq!(mgr.state().await, ConnectionState::Connected);
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "no event may follow an ignored connect"
    );

    mgr.disconnect().await;
}

#[tokio::test]
async fn test_no_events_after_disconnected() {
    let (port, _inbound, outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    mgr.disconnect().await;
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(ConnectionEvent::Disconnected)) => {}
        other => panic!("expected Disconnected, got {other:?}"),
    }

    // The device keeps talking; the closed session must stay silent.
    let _ = outbound.send(Message::Binary(encode_frame(9, 1, &[], "stale")));
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "no events may follow Disconnected"
    );

    // Sends after disconnect generate no wire traffic.
    assert!(mgr.send(1, 10000, &[]).await.is_err());
}

#[tokio::test]
async fn test_connected_setters_send_cumulative_snapshots() {
    let (port, mut inbound, _outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    let camera = CameraController::new(mgr.clone(), CameraKind::Tele);
    camera.set_brightness(50).await.expect("set brightness");
    camera.set_contrast(20).await.expect("set contrast");

    // Two full snapshots must cross the wire; the second one carries both
    // fields (the contrast setter must not erase the brightness).
    let mut snapshots = Vec::new();
    while snapshots.len() < 2 {
        let bytes = timeout(Duration::from_secs(2), inbound.recv())
            .await
            .expect("frame within deadline")
            .expect("frame");
        let (frame, _) = decode_frame(&bytes).expect("decode");
        if frame.module == CameraKind::Tele.module_id()
            && frame.cmd == CameraKind::Tele.cmd_set_all_params()
        {
            snapshots.push(CamParams::decode(&frame.payload).expect("snapshot"));
        }
    }
    assert_eq!(snapshots[0].brightness, Some(128));
    assert_eq!(snapshots[0].contrast, None);
    assert_eq!(snapshots[1].brightness, Some(128));
    assert_eq!(snapshots[1].contrast, Some(51));

    mgr.disconnect().await;
}

#[tokio::test]
async fn test_failed_session_does_not_disturb_the_next_one() {
    let (port, _inbound, outbound) = spawn_device().await;
    let (mgr, mut rx) = ConnectionManager::new(config(port, Duration::from_secs(60)));

    mgr.connect(LOCALHOST).await.expect("connect");
    expect_connected(&mut rx).await;

    // Kill the transport without a close handshake.  The manager reports the
    // failure and tears the whole session down, reader included.
    drop(outbound);
    loop {
        match timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(ConnectionEvent::Error(_))) => continue,
            Ok(Some(ConnectionEvent::Disconnected)) => break,
            other => panic!("expected teardown events, got {other:?}"),
        }
    }
    assert_eq!(mgr.state().await, ConnectionState::Disconnected);

    // New device on the same port.  Nothing left over from the dead session
    // may touch it.
    let listener = loop {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(l) => break l,
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };
    let (_inbound2, outbound2) = spawn_device_on(listener);

    mgr.connect(LOCALHOST).await.expect("reconnect");
    expect_connected(&mut rx).await;

    // The new session receives traffic normally...
    outbound2
        .send(Message::Binary(encode_frame(9, 1, &[0x42], "dev")))
        .unwrap();
    match timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Some(ConnectionEvent::MessageReceived { module, payload, .. })) => {
            assert_eq!(module, 9);
            assert_eq!(payload, vec![0x42]);
        }
        other => panic!("expected MessageReceived on new session, got {other:?}"),
    }

    // ...and stays connected: no stale teardown, no spurious events.
    assert!(
        timeout(Duration::from_millis(300), rx.recv()).await.is_err(),
        "ghost of the failed session disturbed the new one"
    );
    assert_eq!(mgr.state().await, ConnectionState::Connected);

    mgr.disconnect().await;
}
