//! Session controller: folds connection events into the transcript and
//! guards user sends.

use thiserror::Error;

use crate::chat::transcript::{Message, Transcript};
use crate::connection::ConnectionManager;
use crate::protocol::{ClientFrame, InboundEvent};

/// Why a user message was not sent. Guards are checked in this order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendRejected {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a response is still streaming")]
    ResponsePending,
    #[error("not connected")]
    NotConnected,
}

pub struct SessionController {
    transcript: Transcript,
    typing: bool,
    connection: ConnectionManager,
}

impl SessionController {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            transcript: Transcript::default(),
            typing: false,
            connection,
        }
    }

    /// Applies one inbound event to the transcript and typing flag.
    pub fn apply_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Chunk { text } => {
                self.transcript.apply_chunk(&text);
                self.typing = true;
            }
            InboundEvent::Complete => {
                self.typing = false;
            }
            InboundEvent::Error { text } => {
                self.transcript.push_error(&text);
                self.typing = false;
            }
            InboundEvent::Connected => {
                tracing::debug!("session connected");
            }
            InboundEvent::Disconnected => {
                // A drop mid-response never completes; synthesize the ending
                // so the typing flag cannot stick.
                if self.typing {
                    self.transcript
                        .push_error("connection lost while the assistant was responding");
                    self.typing = false;
                } else {
                    tracing::debug!("session disconnected");
                }
            }
        }
    }

    /// Validates and sends a user message on the active session.
    pub fn send_user_message(&mut self, text: &str) -> Result<(), SendRejected> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendRejected::EmptyMessage);
        }
        if self.typing {
            return Err(SendRejected::ResponsePending);
        }
        if !self.connection.is_connected() {
            return Err(SendRejected::NotConnected);
        }
        self.transcript.push_user(text);
        self.dispatch(text);
        Ok(())
    }

    /// Sends a message whose user entry is already in the transcript; used
    /// for a first message held while its session was being created.
    pub fn dispatch_pending(&mut self, text: &str) {
        self.dispatch(text);
    }

    fn dispatch(&mut self, text: &str) {
        self.connection.send(ClientFrame::new(text));
        self.transcript.push_placeholder();
        self.typing = true;
    }

    /// Replaces the transcript with stored history.
    pub fn load_history(&mut self, messages: Vec<Message>) {
        self.transcript.replace(messages);
        self.typing = false;
    }

    /// Records a user entry without sending, for the pending-message flow.
    pub fn push_user(&mut self, text: &str) {
        self.transcript.push_user(text);
    }

    /// Surfaces a local failure as a transcript entry.
    pub fn report_error(&mut self, text: &str) {
        self.transcript.push_error(text);
        self.typing = false;
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.typing = false;
    }

    pub fn transcript(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
