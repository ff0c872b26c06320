//! Connection manager: owns at most one live WebSocket at a time.
//!
//! The public [`ConnectionManager`] is a cheap handle; the actual socket
//! lives in a spawned actor task driven by a command channel, so every
//! lifecycle transition and inbound frame is processed on a single
//! `select!` loop with no locks. Connection status fans out through a
//! `watch` channel (any number of subscribers); inbound events go to a
//! single typed sink registered per `connect` and replaced wholesale on
//! reconnect, so a retired connection can never reach a stale consumer.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::api::SessionId;
use crate::protocol::{ClientFrame, InboundEvent, ServerFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Single-consumer sink for inbound events, one per connected session.
pub type EventSink = mpsc::UnboundedSender<InboundEvent>;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub ws_base: String,
    pub connect_timeout: Duration,
    pub outbound_queue_limit: usize,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid websocket endpoint: {0}")]
    Endpoint(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Transport(#[from] tungstenite::Error),
    #[error("handshake task failed: {0}")]
    Handshake(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Errored,
}

enum Command {
    Connect {
        session_id: SessionId,
        user_id: String,
        sink: EventSink,
    },
    Send {
        frame: ClientFrame,
    },
    Disconnect,
}

/// Handle to the connection actor.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<bool>,
}

impl ConnectionManager {
    /// Spawns the connection actor. Requires a tokio runtime.
    pub fn new(config: ConnectionConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(false);
        tokio::spawn(ConnectionTask::new(cmd_rx, status_tx, config).run());
        Self { cmd_tx, status_rx }
    }

    /// Tears down any prior connection, registers `sink` as the sole inbound
    /// event consumer, and opens a new connection for the session. A
    /// `Connected` event is synthesized once the handshake completes.
    pub fn connect(&self, session_id: SessionId, user_id: &str, sink: EventSink) {
        let _ = self.cmd_tx.send(Command::Connect {
            session_id,
            user_id: user_id.to_string(),
            sink,
        });
    }

    /// Transmits immediately when open, otherwise queues (bounded, FIFO).
    pub fn send(&self, frame: ClientFrame) {
        let _ = self.cmd_tx.send(Command::Send { frame });
    }

    /// Closes the connection with a normal-closure code, clears the outbound
    /// queue and the event sink. No-op when nothing is connected.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Broadcast connection-status signal; independent of the event sink.
    pub fn status(&self) -> watch::Receiver<bool> {
        self.status_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.status_rx.borrow()
    }
}

struct ConnectionTask {
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<bool>,
    config: ConnectionConfig,
    sink: Option<EventSink>,
    queue: VecDeque<ClientFrame>,
    // Invariant: at most one of `handshake`/`socket` is Some, matching
    // Connecting/Open respectively.
    state: ConnectionState,
    handshake: Option<JoinHandle<Result<WsStream, ConnectError>>>,
    socket: Option<WsStream>,
}

impl ConnectionTask {
    fn new(
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        status_tx: watch::Sender<bool>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            cmd_rx,
            status_tx,
            config,
            sink: None,
            queue: VecDeque::new(),
            state: ConnectionState::Disconnected,
            handshake: None,
            socket: None,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect { session_id, user_id, sink }) => {
                        self.handle_connect(session_id, &user_id, sink).await;
                    }
                    Some(Command::Send { frame }) => self.handle_send(frame).await,
                    Some(Command::Disconnect) => self.teardown().await,
                    None => {
                        // Handle dropped; shut down cleanly.
                        self.teardown().await;
                        break;
                    }
                },
                result = poll_handshake(&mut self.handshake), if self.handshake.is_some() => {
                    self.handle_handshake(result).await;
                }
                frame = poll_socket(&mut self.socket), if self.socket.is_some() => {
                    self.handle_frame(frame);
                }
            }
        }
    }

    async fn handle_connect(&mut self, session_id: SessionId, user_id: &str, sink: EventSink) {
        self.teardown().await;
        self.sink = Some(sink);

        let url = match endpoint(&self.config.ws_base, session_id, user_id) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, session_id, "cannot build endpoint");
                self.state = ConnectionState::Errored;
                self.emit(InboundEvent::Error {
                    text: format!("connection failed: {e}"),
                });
                return;
            }
        };

        tracing::info!(session_id, url = %url, "connecting");
        self.state = ConnectionState::Connecting;
        let timeout = self.config.connect_timeout;
        self.handshake = Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
                Ok(Ok((stream, _response))) => Ok(stream),
                Ok(Err(e)) => Err(ConnectError::Transport(e)),
                Err(_) => Err(ConnectError::Timeout(timeout)),
            }
        }));
    }

    async fn handle_handshake(&mut self, result: Result<WsStream, ConnectError>) {
        self.handshake = None;
        match result {
            Ok(stream) => {
                tracing::info!("connection open");
                self.socket = Some(stream);
                self.state = ConnectionState::Open;
                self.status_tx.send_replace(true);
                self.drain_queue().await;
                if self.state == ConnectionState::Open {
                    self.emit(InboundEvent::Connected);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                self.state = ConnectionState::Errored;
                self.status_tx.send_replace(false);
                self.emit(InboundEvent::Error {
                    text: format!("connection failed: {e}"),
                });
            }
        }
    }

    /// Flushes everything submitted while the link was down, oldest first.
    async fn drain_queue(&mut self) {
        while let Some(frame) = self.queue.pop_front() {
            let Some(socket) = self.socket.as_mut() else {
                break;
            };
            if let Err(e) = transmit(socket, &frame).await {
                tracing::warn!(error = %e, "failed to flush queued message");
                self.fail(format!("send failed: {e}"));
                break;
            }
        }
    }

    async fn handle_send(&mut self, frame: ClientFrame) {
        if let Some(socket) = self.socket.as_mut() {
            if let Err(e) = transmit(socket, &frame).await {
                tracing::warn!(error = %e, "send failed, dropping connection");
                self.fail(format!("send failed: {e}"));
            }
        } else if self.queue.len() >= self.config.outbound_queue_limit {
            tracing::error!(
                limit = self.config.outbound_queue_limit,
                "outbound queue full, dropping message"
            );
        } else {
            self.queue.push_back(frame);
        }
    }

    fn handle_frame(&mut self, item: Option<Result<WsMessage, tungstenite::Error>>) {
        match item {
            Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str()),
            Some(Ok(WsMessage::Close(frame))) => {
                tracing::info!(?frame, "server closed connection");
                self.drop_link(ConnectionState::Disconnected);
                self.emit(InboundEvent::Disconnected);
            }
            None => {
                tracing::info!("connection stream ended");
                self.drop_link(ConnectionState::Disconnected);
                self.emit(InboundEvent::Disconnected);
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "transport error");
                self.drop_link(ConnectionState::Errored);
                self.emit(InboundEvent::Error {
                    text: format!("connection error: {e}"),
                });
            }
            // Ping/pong are answered by the protocol layer; binary frames are
            // not part of the wire contract.
            Some(Ok(_)) => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        match ServerFrame::parse(text) {
            Ok(frame) => {
                if let Some(event) = frame.into_event() {
                    self.emit(event);
                }
            }
            Err(e) => tracing::warn!(error = %e, frame = text, "dropping malformed frame"),
        }
    }

    fn emit(&self, event: InboundEvent) {
        if let Some(sink) = &self.sink {
            if sink.send(event).is_err() {
                tracing::debug!("event sink dropped by consumer");
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.drop_link(ConnectionState::Errored);
        self.emit(InboundEvent::Error { text: message });
    }

    fn drop_link(&mut self, state: ConnectionState) {
        self.socket = None;
        self.queue.clear();
        self.state = state;
        self.status_tx.send_replace(false);
    }

    /// Full teardown: aborts an in-flight handshake, closes the socket with a
    /// normal-closure code, clears queue and sink. Safe when already down.
    async fn teardown(&mut self) {
        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
        }
        if let Some(mut socket) = self.socket.take() {
            let close = CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnected".into(),
            };
            if let Err(e) = socket.close(Some(close)).await {
                tracing::debug!(error = %e, "close handshake failed");
            }
        }
        self.queue.clear();
        self.sink = None;
        self.state = ConnectionState::Disconnected;
        self.status_tx.send_replace(false);
    }
}

async fn transmit(socket: &mut WsStream, frame: &ClientFrame) -> Result<(), tungstenite::Error> {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode outbound frame");
            return Ok(());
        }
    };
    socket.send(WsMessage::text(payload)).await
}

async fn poll_handshake(
    handshake: &mut Option<JoinHandle<Result<WsStream, ConnectError>>>,
) -> Result<WsStream, ConnectError> {
    match handshake.as_mut() {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(ConnectError::Handshake(e.to_string())),
        },
        // Guarded by `if handshake.is_some()` in the select.
        None => std::future::pending().await,
    }
}

async fn poll_socket(
    socket: &mut Option<WsStream>,
) -> Option<Result<WsMessage, tungstenite::Error>> {
    match socket.as_mut() {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

/// Endpoint: path-embedded session id, query-string user id.
fn endpoint(
    ws_base: &str,
    session_id: SessionId,
    user_id: &str,
) -> Result<reqwest::Url, ConnectError> {
    let mut url =
        reqwest::Url::parse(ws_base).map_err(|e| ConnectError::Endpoint(e.to_string()))?;
    let path = format!("{}/ws/chat/{session_id}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("user_id", user_id);
    Ok(url)
}
