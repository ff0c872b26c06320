//! Ordered, append-mostly transcript of one conversation.
//!
//! Mutations here are pure (no I/O, no async) so the streaming semantics are
//! trivially testable: the placeholder sentinel is removed exactly once per
//! response, chunks extend the newest assistant entry, and history loads
//! replace the whole vector.

/// Shown as the assistant entry while the first chunk is in flight.
pub const PLACEHOLDER: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }

    fn placeholder() -> Self {
        Self::assistant(PLACEHOLDER)
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    // True between push_placeholder and the first chunk (or an error). The
    // flag, not the text, decides placeholder removal: a response whose first
    // chunk is literally "..." must not be swallowed.
    pending_placeholder: bool,
}

impl Transcript {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Appends the waiting indicator. At most one is pending at a time.
    pub fn push_placeholder(&mut self) {
        if self.pending_placeholder {
            return;
        }
        self.messages.push(Message::placeholder());
        self.pending_placeholder = true;
    }

    /// Records a failure as an assistant entry, displacing any pending
    /// placeholder.
    pub fn push_error(&mut self, text: &str) {
        if self.pending_placeholder {
            self.messages.pop();
            self.pending_placeholder = false;
        }
        self.messages.push(Message::assistant(format!("Error: {text}")));
    }

    /// Folds a streamed chunk into the transcript: the first chunk of a
    /// response replaces the placeholder, later chunks extend the newest
    /// assistant entry in arrival order.
    pub fn apply_chunk(&mut self, chunk: &str) {
        if self.pending_placeholder {
            self.messages.pop();
            self.pending_placeholder = false;
            self.messages.push(Message::assistant(chunk));
            return;
        }
        match self.messages.last_mut() {
            Some(last) if last.sender == Sender::Assistant => last.text.push_str(chunk),
            _ => self.messages.push(Message::assistant(chunk)),
        }
    }

    /// Wholesale replacement, used when loading stored history.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.pending_placeholder = false;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending_placeholder = false;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
