//! Duplex transport to the voice-character service.
//!
//! One websocket carries both directions: outbound binary PCM frames and
//! JSON text control messages, inbound audio chunks and server messages.
//! The connection task owns the socket; the rest of the crate talks to it
//! through channels, so nothing here blocks the animation thread.
//!
//! ## State machine
//!
//! ```text
//! Idle ──initialize()──► Connecting ──ok──► Open
//!   ▲                        │               │ socket lost
//!   │ dispose()              │ fail          ▼
//!   └────────────────────── Reconnecting ◄───┘
//!                              │ budget spent
//!                              ▼
//!                          Exhausted (terminal)
//! ```
//!
//! A successful connection resets the retry budget. `dispose()` sends a
//! normal close frame and never reconnects.

pub mod protocol;
pub mod reconnect;

pub use protocol::{ClientMessage, ServerMessage};
pub use reconnect::ReconnectPolicy;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::{
    config::ReconnectConfig,
    error::{Result, VultusError},
    events::ConnectionEvent,
};

/// Lifecycle state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created or disposed; no socket.
    Idle,
    /// First dial in progress.
    Connecting,
    /// Socket established and usable.
    Open,
    /// Waiting out the fixed delay before another dial.
    Reconnecting,
    /// Retry budget spent — terminal until a fresh session.
    Exhausted,
}

/// Inbound notifications drained by the session.
#[derive(Debug)]
pub enum NetEvent {
    Connected,
    Message(ServerMessage),
    Audio(Vec<u8>),
    Disconnected,
    Exhausted,
}

enum OutboundFrame {
    Binary(Vec<u8>),
    Text(String),
}

/// Depth of the inbound event channel toward the session.
const NET_EVENT_CAP: usize = 128;
/// Depth of the outbound frame channel toward the socket.
const OUTBOUND_CAP: usize = 64;
/// Broadcast capacity for connection state events.
const BROADCAST_CAP: usize = 32;

/// Owns the websocket lifecycle: dialing, demux, bounded reconnection.
pub struct TransportSession {
    url: Url,
    reconnect: ReconnectConfig,
    state: std::sync::Arc<Mutex<ConnectionState>>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    /// Taken by the first `initialize()`; duplicates find it empty.
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundFrame>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TransportSession {
    /// Create a transport for `url`. Does not dial — call `initialize()`.
    pub fn new(url: &str, reconnect: ReconnectConfig) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| VultusError::Connection(format!("invalid server url: {e}")))?;
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAP);
        let (connection_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            url,
            reconnect,
            state: std::sync::Arc::new(Mutex::new(ConnectionState::Idle)),
            connection_tx,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown_tx,
        })
    }

    /// Spawn the connection task and return the inbound event stream.
    ///
    /// A second call is a logged no-op returning `None` — the socket is
    /// already being driven.
    pub fn initialize(&self) -> Option<mpsc::Receiver<NetEvent>> {
        let Some(outbound_rx) = self.outbound_rx.lock().take() else {
            warn!("transport already initialised, ignoring");
            return None;
        };

        let (net_tx, net_rx) = mpsc::channel(NET_EVENT_CAP);
        let loop_ctx = ConnectionLoop {
            url: self.url.clone(),
            policy: ReconnectPolicy::new(&self.reconnect),
            state: std::sync::Arc::clone(&self.state),
            connection_tx: self.connection_tx.clone(),
            net_tx,
            outbound_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
        };
        tokio::spawn(loop_ctx.run());

        Some(net_rx)
    }

    /// Queue one binary PCM frame. Silently dropped unless Open.
    pub fn send_binary(&self, frame: Vec<u8>) {
        self.send_frame(OutboundFrame::Binary(frame));
    }

    /// Queue one control message. Silently dropped unless Open.
    pub fn send_message(&self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => self.send_frame(OutboundFrame::Text(text)),
            Err(e) => error!("failed to encode client message: {e}"),
        }
    }

    fn send_frame(&self, frame: OutboundFrame) {
        if self.state() != ConnectionState::Open {
            trace!("dropping frame while not open");
            return;
        }
        if self.outbound_tx.try_send(frame).is_err() {
            warn!("outbound backlog full, dropping frame");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection_tx.subscribe()
    }

    /// Close the socket with a normal close frame and stop reconnecting.
    /// Safe to call twice.
    pub fn dispose(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Everything the connection task owns.
struct ConnectionLoop {
    url: Url,
    policy: ReconnectPolicy,
    state: std::sync::Arc<Mutex<ConnectionState>>,
    connection_tx: broadcast::Sender<ConnectionEvent>,
    net_tx: mpsc::Sender<NetEvent>,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionLoop {
    fn set_state(&self, new_state: ConnectionState, detail: Option<String>) {
        *self.state.lock() = new_state;
        let _ = self.connection_tx.send(ConnectionEvent {
            state: new_state,
            detail,
        });
    }

    async fn run(mut self) {
        self.set_state(ConnectionState::Connecting, None);

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _response)) => {
                    info!(url = %self.url, "connected");
                    self.policy.on_connected();
                    self.set_state(ConnectionState::Open, None);
                    let _ = self.net_tx.send(NetEvent::Connected).await;

                    if self.drive(socket).await {
                        // Clean shutdown requested by dispose().
                        self.set_state(ConnectionState::Idle, None);
                        return;
                    }
                    let _ = self.net_tx.send(NetEvent::Disconnected).await;
                }
                Err(e) => {
                    warn!(url = %self.url, "connect failed: {e}");
                }
            }

            if *self.shutdown_rx.borrow() {
                self.set_state(ConnectionState::Idle, None);
                return;
            }

            match self.policy.next_retry() {
                Some(delay) => {
                    self.set_state(
                        ConnectionState::Reconnecting,
                        Some(format!("attempt {}", self.policy.attempts())),
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown_rx.changed() => {
                            self.set_state(ConnectionState::Idle, None);
                            return;
                        }
                    }
                }
                None => {
                    let err = VultusError::ReconnectExhausted {
                        attempts: self.policy.attempts(),
                    };
                    error!("{err}");
                    self.set_state(ConnectionState::Exhausted, Some(err.to_string()));
                    let _ = self.net_tx.send(NetEvent::Exhausted).await;
                    return;
                }
            }
        }
    }

    /// Pump one live socket. Returns `true` when a clean shutdown was
    /// requested, `false` when the socket was lost.
    async fn drive(
        &mut self,
        socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    ) -> bool {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        info!("socket closed by dispose");
                        return true;
                    }
                }

                frame = self.outbound_rx.recv() => match frame {
                    Some(OutboundFrame::Binary(buf)) => {
                        if let Err(e) = write.send(Message::Binary(buf)).await {
                            warn!("binary send failed: {e}");
                            return false;
                        }
                    }
                    Some(OutboundFrame::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!("text send failed: {e}");
                            return false;
                        }
                    }
                    None => {
                        // Session dropped its handle; treat as dispose.
                        let _ = write.send(Message::Close(None)).await;
                        return true;
                    }
                },

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ServerMessage::parse(&text) {
                            Ok(parsed) => {
                                let _ = self.net_tx.send(NetEvent::Message(parsed)).await;
                            }
                            Err(e) => {
                                warn!("dropping inbound frame: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(buf))) => {
                        let _ = self.net_tx.send(NetEvent::Audio(buf)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the connection");
                        return false;
                    }
                    // Ping/pong are answered by the library.
                    Some(Ok(other)) => {
                        debug!("ignoring frame: {other:?}");
                    }
                    Some(Err(e)) => {
                        warn!("socket error: {e}");
                        return false;
                    }
                    None => {
                        info!("socket stream ended");
                        return false;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TransportSession {
        TransportSession::new("ws://127.0.0.1:9/chat", ReconnectConfig::default())
            .expect("valid url")
    }

    #[test]
    fn connection_state_serialises_lowercase() {
        let json = serde_json::to_value(ConnectionState::Exhausted).unwrap();
        assert_eq!(json, "exhausted");
        let state: ConnectionState = serde_json::from_value(json).unwrap();
        assert_eq!(state, ConnectionState::Exhausted);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = TransportSession::new("not a url", ReconnectConfig::default());
        assert!(matches!(err, Err(VultusError::Connection(_))));
    }

    #[test]
    fn new_session_starts_idle_and_drops_sends() {
        let session = session();
        assert_eq!(session.state(), ConnectionState::Idle);
        // Not open — frames vanish without error or queueing.
        session.send_binary(vec![0, 1, 2]);
        session.send_message(&ClientMessage::TextMessage { text: "hi".into() });
    }

    #[tokio::test]
    async fn duplicate_initialize_is_a_noop() {
        let session = session();
        let first = session.initialize();
        assert!(first.is_some());
        let second = session.initialize();
        assert!(second.is_none());
        session.dispose();
    }

    #[tokio::test]
    async fn unreachable_server_eventually_exhausts() {
        // Port 9 (discard) refuses websocket upgrades immediately; with a
        // zero delay the budget burns down without waiting.
        let session = TransportSession::new(
            "ws://127.0.0.1:9/chat",
            ReconnectConfig {
                delay_ms: 1,
                max_attempts: 2,
            },
        )
        .expect("valid url");

        let mut conn_rx = session.subscribe_connection();
        let mut rx = session.initialize().expect("first initialize");
        loop {
            match rx.recv().await {
                Some(NetEvent::Exhausted) => break,
                Some(_) => continue,
                None => panic!("event channel closed before exhaustion"),
            }
        }
        assert_eq!(session.state(), ConnectionState::Exhausted);

        // The terminal state event names the spent attempt budget.
        let mut exhausted_detail = None;
        while let Ok(event) = conn_rx.try_recv() {
            if event.state == ConnectionState::Exhausted {
                exhausted_detail = event.detail;
            }
        }
        let detail = exhausted_detail.expect("exhausted event with detail");
        assert!(detail.contains("2 tries"), "detail: {detail}");
    }
}
