//! Session orchestrator: the single coordination point between the REST
//! collaborator, the connection manager, and the session controller.
//!
//! Tracks which session is selected (highlighted) versus active (connected),
//! bootstraps a default session for a fresh user, and holds a first message
//! while its session is being created so it can be dispatched on connect.

use tokio::sync::mpsc;

use crate::api::{ApiError, ChatApi, ConversationSession, SessionId, StoredMessage};
use crate::chat::{SendRejected, SessionController};
use crate::protocol::InboundEvent;

const DEFAULT_SESSION_TITLE: &str = "Welcome Chat";
const NEW_SESSION_TITLE: &str = "New Chat";
const TITLE_PREVIEW_LEN: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error(transparent)]
    Rejected(#[from] SendRejected),
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct Orchestrator<A: ChatApi> {
    api: A,
    user_id: String,
    controller: SessionController,
    sessions: Vec<ConversationSession>,
    active_session: Option<SessionId>,
    selected_session: Option<SessionId>,
    // First message of a just-created session, dispatched on Connected.
    pending_input: Option<String>,
    events: Option<mpsc::UnboundedReceiver<InboundEvent>>,
}

impl<A: ChatApi> Orchestrator<A> {
    pub fn new(api: A, controller: SessionController, user_id: String) -> Self {
        Self {
            api,
            user_id,
            controller,
            sessions: Vec::new(),
            active_session: None,
            selected_session: None,
            pending_input: None,
            events: None,
        }
    }

    /// Loads the session list and ensures at least one session exists; a
    /// fresh user gets a default session, opened immediately.
    pub async fn bootstrap(&mut self) -> Result<(), ApiError> {
        self.sessions = self.api.list_sessions(&self.user_id).await?;
        self.sessions.sort_by_key(|s| s.created_at);
        if self.sessions.is_empty() {
            tracing::info!(user_id = %self.user_id, "no sessions, creating default");
            let session = self
                .api
                .create_session(&self.user_id, DEFAULT_SESSION_TITLE)
                .await?;
            let id = session.id;
            self.sessions.push(session);
            self.selected_session = Some(id);
            self.activate(id);
        }
        Ok(())
    }

    /// Makes `id` the live session: fresh event channel, new connection.
    /// Events from any previous connection become unroutable.
    fn activate(&mut self, id: SessionId) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.controller.connection().connect(id, &self.user_id, tx);
        self.active_session = Some(id);
    }

    /// Selects a session, loads its stored history, and connects to it.
    /// Reopening the already-active session is a no-op. Any draft held for a
    /// session that never connected is discarded on the switch.
    pub async fn open_session(&mut self, id: SessionId) -> Result<(), ApiError> {
        if self.active_session == Some(id) {
            self.selected_session = Some(id);
            return Ok(());
        }
        self.selected_session = Some(id);
        self.pending_input = None;
        let mut stored = self.api.get_messages(&self.user_id, id).await?;
        stored.sort_by_key(|m| (m.timestamp, m.id));
        self.controller
            .load_history(stored.into_iter().map(StoredMessage::into_message).collect());
        self.activate(id);
        Ok(())
    }

    /// Creates a fresh "New Chat" session and connects to it with an empty
    /// transcript.
    pub async fn new_session(&mut self) -> Result<(), ApiError> {
        let session = self
            .api
            .create_session(&self.user_id, NEW_SESSION_TITLE)
            .await?;
        self.detach();
        let id = session.id;
        self.sessions.push(session);
        self.activate(id);
        Ok(())
    }

    /// Drops the live connection, transcript, and any held draft.
    fn detach(&mut self) {
        self.controller.connection().disconnect();
        self.controller.clear();
        self.active_session = None;
        self.selected_session = None;
        self.pending_input = None;
        self.events = None;
    }

    /// Routes user input: sends on the active session, or creates a session
    /// titled after the message and holds the input until connected.
    pub async fn send_input(&mut self, text: &str) -> Result<(), InputError> {
        if self.active_session.is_some() {
            self.controller.send_user_message(text)?;
            return Ok(());
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(SendRejected::EmptyMessage.into());
        }
        self.controller.push_user(text);

        // The draft is held only once the session exists; a failed create
        // surfaces in the transcript and the input is not retried later.
        let session = match self
            .api
            .create_session(&self.user_id, &title_preview(text))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create a session for the draft");
                self.controller.report_error("failed to create chat session");
                return Err(e.into());
            }
        };
        self.pending_input = Some(text.to_string());
        let id = session.id;
        self.sessions.push(session);
        self.selected_session = Some(id);
        self.activate(id);
        Ok(())
    }

    /// Drops local state for every session. Server-side rows are untouched.
    pub fn clear_all(&mut self) {
        self.detach();
        self.sessions.clear();
    }

    pub async fn refresh_sessions(&mut self) -> Result<(), ApiError> {
        self.sessions = self.api.list_sessions(&self.user_id).await?;
        self.sessions.sort_by_key(|s| s.created_at);
        Ok(())
    }

    /// Waits for the next event from the live connection. Pends forever when
    /// no session is active, so it composes with `select!`.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        match self.events.as_mut() {
            Some(rx) => match rx.recv().await {
                Some(event) => Some(event),
                None => {
                    self.events = None;
                    None
                }
            },
            None => std::future::pending().await,
        }
    }

    /// Applies one event, first dispatching a held first message when the
    /// new session's connection comes up.
    pub fn handle_event(&mut self, event: InboundEvent) {
        if event == InboundEvent::Connected {
            if let Some(text) = self.pending_input.take() {
                self.controller.dispatch_pending(&text);
            }
        }
        self.controller.apply_event(event);
    }

    /// A session is highlighted when it is connected or merely clicked
    /// (selected but still loading).
    pub fn is_session_selected(&self, id: SessionId) -> bool {
        self.selected_session == Some(id) || self.active_session == Some(id)
    }

    pub fn sessions(&self) -> &[ConversationSession] {
        &self.sessions
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }
}

/// Session title derived from a first message: up to 30 characters, with an
/// ellipsis when truncated.
fn title_preview(text: &str) -> String {
    if text.chars().count() <= TITLE_PREVIEW_LEN {
        return text.to_string();
    }
    let mut title: String = text.chars().take(TITLE_PREVIEW_LEN).collect();
    title.push_str("...");
    title
}
