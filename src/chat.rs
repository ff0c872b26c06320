//! Transcript assembly and per-session send/typing state.

pub mod controller;
pub mod transcript;

#[cfg(test)]
mod proptests;

pub use controller::{SendRejected, SessionController};
pub use transcript::{Message, Sender, Transcript};
