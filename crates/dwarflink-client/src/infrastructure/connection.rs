//! Device control-channel connection management.
//!
//! The device speaks binary frames over a WebSocket on a fixed control port.
//! `ConnectionManager` owns exactly one logical session:
//!
//! - `connect` dials the device, generates a fresh session id, and spawns a
//!   read task plus a keepalive task.
//! - Inbound binary messages are decoded and re-emitted as
//!   [`ConnectionEvent::MessageReceived`]; malformed frames are logged and
//!   dropped without touching the session.
//! - The keepalive task sends a zero-payload frame to module 0 / cmd 0 at a
//!   fixed interval so the device does not tear the socket down as idle.
//! - Transport failures transition straight to `Disconnected` and are
//!   reported as events; this layer never retries (reconnect policy belongs
//!   to the caller).
//!
//! WebSocket messages are already delimited, so unlike a raw TCP stream no
//! receive buffer is needed here: every `Message::Binary` is exactly one
//! frame.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use dwarflink_core::protocol::envelope::{decode_frame, encode_frame};
use dwarflink_core::protocol::modules::{KEEPALIVE_CMD, KEEPALIVE_MODULE};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Builds the control-channel URL.  `SocketAddr` formatting brackets IPv6
/// addresses, which a plain `{ip}:{port}` format would not.
fn control_url(ip: IpAddr, port: u16) -> String {
    format!("ws://{}", std::net::SocketAddr::new(ip, port))
}

/// Errors surfaced by the connection manager.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// An operation requiring an active session was invoked while
    /// disconnected.  No wire traffic is generated.
    #[error("not connected to a device")]
    NotConnected,

    /// The WebSocket handshake to the device failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// The established transport failed; the session is gone.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Connection lifecycle states.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`.  A connect
/// request in `Connecting` or `Connected` is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Configuration for the device control channel.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket control port on the device.
    pub control_port: u16,
    /// Interval between keepalive frames while connected.
    pub keepalive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            control_port: 9900,
            keepalive_interval: Duration::from_secs(5),
        }
    }
}

/// Events emitted by the connection manager to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The control channel is up; `session_id` is stamped on every outbound
    /// frame of this session.
    Connected { session_id: String },
    /// The session ended (explicit disconnect, remote close, or after a
    /// transport error).  No further events follow until the next connect.
    Disconnected,
    /// A connection or transport failure, with a human-readable message.
    Error(String),
    /// A decoded inbound frame.
    MessageReceived {
        module: u32,
        cmd: u32,
        payload: Vec<u8>,
    },
}

/// Manages the single WebSocket session to the device.
///
/// Created with [`ConnectionManager::new`], which returns the manager inside
/// an `Arc` (the read and keepalive tasks hold clones) together with the
/// event receiver.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    sink: Mutex<Option<WsSink>>,
    session_id: Mutex<Option<String>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
    event_tx: mpsc::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Creates a new manager in the `Disconnected` state and returns it with
    /// the event receiver.
    pub fn new(config: ConnectionConfig) -> (Arc<Self>, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let mgr = Arc::new(Self {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            sink: Mutex::new(None),
            session_id: Mutex::new(None),
            read_task: Mutex::new(None),
            keepalive_task: Mutex::new(None),
            event_tx: tx,
        });
        (mgr, rx)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Convenience check used by the command controllers.
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Opens the control channel to `ip` on the configured port.
    ///
    /// Idempotent: a call while `Connecting` or `Connected` is ignored.  On
    /// success a fresh session id is generated and `Connected` is emitted;
    /// on failure the manager returns to `Disconnected` and emits `Error`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Connect`] when the WebSocket handshake
    /// fails.
    pub async fn connect(self: &Arc<Self>, ip: IpAddr) -> Result<(), ConnectionError> {
        {
            let mut state = self.state.lock().await;
            if *state != ConnectionState::Disconnected {
                debug!("connect to {ip} ignored: already {:?}", *state);
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        let url = control_url(ip, self.config.control_port);
        info!("connecting to device at {url}");

        let ws = match connect_async(&url).await {
            Ok((ws, _response)) => ws,
            Err(source) => {
                *self.state.lock().await = ConnectionState::Disconnected;
                let _ = self
                    .event_tx
                    .send(ConnectionEvent::Error(format!(
                        "connection to {url} failed: {source}"
                    )))
                    .await;
                return Err(ConnectionError::Connect { url, source });
            }
        };

        {
            // disconnect() may have raced the handshake; if so, drop the
            // socket instead of resurrecting the session.
            let mut state = self.state.lock().await;
            if *state != ConnectionState::Connecting {
                debug!("connect to {url} abandoned: state changed during handshake");
                return Ok(());
            }
            *state = ConnectionState::Connected;
        }

        let session_id = Uuid::new_v4().to_string();
        let (sink, source) = ws.split();
        *self.sink.lock().await = Some(sink);
        *self.session_id.lock().await = Some(session_id.clone());

        info!("device connected, session {session_id}");
        let _ = self
            .event_tx
            .send(ConnectionEvent::Connected {
                session_id: session_id.clone(),
            })
            .await;

        let reader = Arc::clone(self);
        *self.read_task.lock().await = Some(tokio::spawn(async move {
            reader.read_loop(source).await;
        }));

        let pinger = Arc::clone(self);
        *self.keepalive_task.lock().await = Some(tokio::spawn(async move {
            pinger.keepalive_loop().await;
        }));

        Ok(())
    }

    /// Tears the session down.  Safe to call from any state; repeated calls
    /// are no-ops.  No events are emitted after the `Disconnected` event.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }

        if let Some(handle) = self.keepalive_task.lock().await.take() {
            handle.abort();
        }
        // Abort the reader before emitting Disconnected so nothing can be
        // emitted after it.
        if let Some(handle) = self.read_task.lock().await.take() {
            handle.abort();
        }

        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(WsMessage::Close(None)).await;
        }
        *self.session_id.lock().await = None;

        info!("disconnected from device");
        let _ = self.event_tx.send(ConnectionEvent::Disconnected).await;
    }

    /// Encodes and transmits one command frame.
    ///
    /// There is no outbound queue: the frame is written immediately or the
    /// call fails.  A write failure tears the session down.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotConnected`] when no session is active,
    /// [`ConnectionError::Transport`] when the write fails.
    pub async fn send(&self, module: u32, cmd: u32, payload: &[u8]) -> Result<(), ConnectionError> {
        if *self.state.lock().await != ConnectionState::Connected {
            warn!(module, cmd, "dropping command: not connected");
            return Err(ConnectionError::NotConnected);
        }

        let session_id = self.session_id.lock().await.clone().unwrap_or_default();
        let bytes = encode_frame(module, cmd, payload, &session_id);

        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };

        if let Err(e) = sink.send(WsMessage::Binary(bytes)).await {
            drop(guard);
            let reason = format!("write failed: {e}");
            self.transition_disconnected(Some(reason.clone())).await;
            return Err(ConnectionError::Transport(reason));
        }

        debug!(module, cmd, payload_len = payload.len(), "sent command");
        Ok(())
    }

    // ── Internal tasks ────────────────────────────────────────────────────────

    /// Reads and decodes inbound frames until the transport ends.
    async fn read_loop(self: Arc<Self>, mut source: WsSource) {
        while let Some(item) = source.next().await {
            match item {
                Ok(WsMessage::Binary(bytes)) => match decode_frame(&bytes) {
                    Ok((frame, _consumed)) => {
                        debug!(
                            module = frame.module,
                            cmd = frame.cmd,
                            payload_len = frame.payload.len(),
                            "received frame"
                        );
                        if self
                            .event_tx
                            .send(ConnectionEvent::MessageReceived {
                                module: frame.module,
                                cmd: frame.cmd,
                                payload: frame.payload,
                            })
                            .await
                            .is_err()
                        {
                            // Consumer gone; nothing left to deliver to.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("dropping malformed frame ({} bytes): {e}", bytes.len());
                    }
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {} // text/ping/pong are not part of the device protocol
                Err(e) => {
                    self.transition_disconnected(Some(format!("read failed: {e}")))
                        .await;
                    return;
                }
            }
        }
        self.transition_disconnected(None).await;
    }

    /// Sends keepalive frames until the session ends.
    async fn keepalive_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.keepalive_interval);
        // The first tick of a tokio interval completes immediately; consume
        // it so pings start one full interval after connect.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self
                .send(KEEPALIVE_MODULE, KEEPALIVE_CMD, &[])
                .await
                .is_err()
            {
                return;
            }
        }
    }

    /// Transitions to `Disconnected` after a transport-level failure or a
    /// remote close, emitting `Error` (when there is one) then
    /// `Disconnected`.  Invoked from the read and keepalive tasks.
    async fn transition_disconnected(&self, error: Option<String>) {
        {
            let mut state = self.state.lock().await;
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }

        *self.sink.lock().await = None;
        *self.session_id.lock().await = None;

        if let Some(message) = error {
            warn!("session lost: {message}");
            let _ = self.event_tx.send(ConnectionEvent::Error(message)).await;
        } else {
            info!("device closed the connection");
        }
        let _ = self.event_tx.send(ConnectionEvent::Disconnected).await;

        // Aborted last: when the keepalive or read task itself detected the
        // failure, the events above are already on the channel before the
        // task dies.  The read task must not outlive the session: a stale
        // reader would emit events after Disconnected and could tear down a
        // later session when its dead stream finally errors.
        if let Some(handle) = self.keepalive_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.read_task.lock().await.take() {
            handle.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_device_contract() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.control_port, 9900);
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_control_url_brackets_ipv6_addresses() {
        let v4: IpAddr = "192.168.1.50".parse().unwrap();
        assert_eq!(control_url(v4, 9900), "ws://192.168.1.50:9900");

        let v6: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(control_url(v6, 9900), "ws://[fe80::1]:9900");
    }

    #[tokio::test]
    async fn test_new_manager_starts_disconnected() {
        let (mgr, _rx) = ConnectionManager::new(ConnectionConfig::default());
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
        assert!(!mgr.is_connected().await);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_returns_not_connected() {
        let (mgr, _rx) = ConnectionManager::new(ConnectionConfig::default());
        let result = mgr.send(1, 10000, &[1, 2, 3]).await;
        assert!(matches!(result, Err(ConnectionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_while_disconnected_is_silent() {
        let (mgr, mut rx) = ConnectionManager::new(ConnectionConfig::default());
        mgr.disconnect().await;
        mgr.disconnect().await;
        // No events may be emitted for a no-op disconnect.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_address_reports_error() {
        let (mgr, mut rx) = ConnectionManager::new(ConnectionConfig {
            // Nothing listens on this loopback port.
            control_port: 1,
            keepalive_interval: Duration::from_secs(5),
        });
        let result = mgr.connect("127.0.0.1".parse().unwrap()).await;
        assert!(matches!(result, Err(ConnectionError::Connect { .. })));
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);

        match rx.recv().await {
            Some(ConnectionEvent::Error(msg)) => {
                assert!(msg.contains("127.0.0.1"), "error should name the target")
            }
            other => panic!("expected Error event, got {other:?}"),
        }
    }
}
