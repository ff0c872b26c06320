//! Test doubles: an in-memory `ChatApi` and a scripted WebSocket server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::api::{ApiError, ChatApi, ConversationSession, SessionId, StoredMessage};
use crate::protocol::{ClientFrame, InboundEvent};

/// Receives the next inbound event, bounded so a broken test fails instead
/// of hanging.
pub async fn recv_event(
    rx: &mut mpsc::UnboundedReceiver<InboundEvent>,
) -> Option<InboundEvent> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
}

#[derive(Default)]
struct MockState {
    sessions: Vec<ConversationSession>,
    messages: HashMap<SessionId, Vec<StoredMessage>>,
    next_id: SessionId,
    create_fails: bool,
}

/// In-memory `ChatApi` with seedable sessions and history.
#[derive(Default)]
pub struct MockChatApi {
    state: Mutex<MockState>,
}

impl MockChatApi {
    pub fn seed_session(&self, title: &str) -> SessionId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.sessions.push(ConversationSession {
            id,
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        id
    }

    /// Makes every subsequent `create_session` fail with a server error.
    pub fn fail_creates(&self) {
        self.state.lock().unwrap().create_fails = true;
    }

    pub fn seed_messages(&self, session_id: SessionId, entries: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let stored = entries
            .iter()
            .enumerate()
            .map(|(i, (sender, content))| StoredMessage {
                id: i64::try_from(i).unwrap() + 1,
                sender: (*sender).to_string(),
                content: (*content).to_string(),
                timestamp: Utc::now(),
            })
            .collect();
        state.messages.insert(session_id, stored);
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn list_sessions(&self, _user_id: &str) -> Result<Vec<ConversationSession>, ApiError> {
        Ok(self.state.lock().unwrap().sessions.clone())
    }

    async fn create_session(
        &self,
        _user_id: &str,
        title: &str,
    ) -> Result<ConversationSession, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.create_fails {
            return Err(ApiError::Status(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        state.next_id += 1;
        let session = ConversationSession {
            id: state.next_id,
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_messages(
        &self,
        _user_id: &str,
        session_id: SessionId,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// What a [`ScriptServer`] connection does: frames pushed after the
/// handshake, then canned replies per received message.
#[derive(Debug, Clone, Default)]
pub struct ServerScript {
    pub greeting: Vec<String>,
    pub per_message: Vec<Vec<String>>,
    pub close_after_greeting: bool,
}

/// In-process WebSocket server on an ephemeral port. Accepts any number of
/// connections, each running the same script; received message payloads are
/// forwarded for assertions.
pub struct ScriptServer {
    addr: SocketAddr,
    msg_rx: mpsc::UnboundedReceiver<String>,
    accept_task: JoinHandle<()>,
}

impl ScriptServer {
    pub async fn start(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let script = script.clone();
                let msg_tx = msg_tx.clone();
                tokio::spawn(run_connection(stream, script, msg_tx));
            }
        });

        Self {
            addr,
            msg_rx,
            accept_task,
        }
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// The `message` payload of the next frame the server received.
    pub async fn recv_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.msg_rx.recv())
            .await
            .expect("timed out waiting for client message")
    }

    pub fn try_recv_message(&mut self) -> Option<String> {
        self.msg_rx.try_recv().ok()
    }
}

impl Drop for ScriptServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn run_connection(
    stream: tokio::net::TcpStream,
    script: ServerScript,
    msg_tx: mpsc::UnboundedSender<String>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    for frame in script.greeting {
        if ws.send(WsMessage::text(frame)).await.is_err() {
            return;
        }
    }
    if script.close_after_greeting {
        let _ = ws.close(None).await;
        return;
    }

    let mut replies = script.per_message.into_iter();
    while let Some(Ok(message)) = ws.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let payload = serde_json::from_str::<ClientFrame>(text.as_str())
            .map_or_else(|_| text.as_str().to_string(), |frame| frame.message);
        let _ = msg_tx.send(payload);

        for frame in replies.next().unwrap_or_default() {
            if ws.send(WsMessage::text(frame)).await.is_err() {
                return;
            }
        }
    }
}
