//! REST collaborator for session metadata and stored history.
//!
//! The trait seam exists so the orchestrator can be driven by an in-memory
//! fake in tests; `HttpChatApi` is the production adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::transcript::{Message, Sender};

/// Server-assigned conversation identifier.
pub type SessionId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted transcript entry as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    /// Wire senders are `"user"` and `"bot"`; anything unexpected is treated
    /// as assistant output rather than dropped.
    pub fn into_message(self) -> Message {
        let sender = if self.sender == "user" {
            Sender::User
        } else {
            Sender::Assistant
        };
        Message {
            sender,
            text: self.content,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("invalid API base URL: {0}")]
    BaseUrl(String),
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ConversationSession>, ApiError>;

    async fn create_session(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<ConversationSession, ApiError>;

    async fn get_messages(
        &self,
        user_id: &str,
        session_id: SessionId,
    ) -> Result<Vec<StoredMessage>, ApiError>;
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    user_id: &'a str,
    title: &'a str,
}

pub struct HttpChatApi {
    client: reqwest::Client,
    base: reqwest::Url,
}

impl HttpChatApi {
    pub fn new(api_base: &str) -> Result<Self, ApiError> {
        let base =
            reqwest::Url::parse(api_base).map_err(|e| ApiError::BaseUrl(e.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    fn url(&self, path: &str) -> reqwest::Url {
        let mut url = self.base.clone();
        let joined = format!("{}/{path}", url.path().trim_end_matches('/'));
        url.set_path(&joined);
        url
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ConversationSession>, ApiError> {
        let mut url = self.url("api/chat/sessions");
        url.query_pairs_mut().append_pair("user_id", user_id);
        let response = self.client.get(url).send().await?;
        match response.status() {
            // An unknown user simply has no sessions yet.
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(ApiError::Status(status)),
        }
    }

    async fn create_session(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<ConversationSession, ApiError> {
        let url = self.url("api/chat/sessions");
        let response = self
            .client
            .post(url)
            .json(&CreateSessionBody { user_id, title })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(ApiError::Status(status))
        }
    }

    async fn get_messages(
        &self,
        user_id: &str,
        session_id: SessionId,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let mut url = self.url(&format!("api/chat/{session_id}/messages"));
        url.query_pairs_mut().append_pair("user_id", user_id);
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(ApiError::Status(status)),
        }
    }
}
