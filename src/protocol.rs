//! Wire contract for the chat WebSocket.
//!
//! Inbound frames are JSON text payloads tagged by a `type` field; outbound
//! frames carry a single `message` field. Anything that fails to parse is
//! dropped by the connection manager, never surfaced to the transcript.

use serde::{Deserialize, Serialize};

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// An incremental piece of the assistant's response.
    Chunk { content: String },
    /// The assistant finished the current response.
    Complete {
        #[serde(default)]
        content: Option<String>,
    },
    /// Application-level failure reported by the peer.
    Error { content: String },
    /// Informational banner sent right after connect; not transcript content.
    Info { content: String },
    /// Server-side progress notice ("Processing your question..."); dropped.
    Status { content: String },
}

impl ServerFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Map a frame to the event the assembler consumes. Informational frames
    /// produce no event.
    pub fn into_event(self) -> Option<InboundEvent> {
        match self {
            ServerFrame::Chunk { content } => Some(InboundEvent::Chunk { text: content }),
            ServerFrame::Complete { .. } => Some(InboundEvent::Complete),
            ServerFrame::Error { content } => Some(InboundEvent::Error { text: content }),
            ServerFrame::Info { content } | ServerFrame::Status { content } => {
                tracing::debug!(content = %content, "ignoring informational frame");
                None
            }
        }
    }
}

/// The single outbound frame shape: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub message: String,
}

impl ClientFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Events delivered from the connection manager to the session controller.
///
/// `Connected` is synthesized locally once the handshake completes; `Error`
/// covers both peer-reported failures and transport errors, `Disconnected`
/// only clean closes, so the assembler can tell remote failure from a
/// dropped link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Chunk { text: String },
    Complete,
    Error { text: String },
    Connected,
    Disconnected,
}
