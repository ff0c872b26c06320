//! Environment-driven configuration.

use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:8000";
const DEFAULT_USER_ID: &str = "User";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUEUE_LIMIT: usize = 64;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the REST collaborator (session list/create, history).
    pub api_base: String,
    /// Base URL of the WebSocket endpoint. Derived from `api_base` when unset.
    pub ws_base: String,
    /// Identity injected into the orchestrator; constant for the process.
    pub user_id: String,
    pub connect_timeout: Duration,
    pub outbound_queue_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let api_base = var("STREAMCHAT_API").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let ws_base = var("STREAMCHAT_WS").unwrap_or_else(|| derive_ws_base(&api_base));
        let user_id = var("STREAMCHAT_USER").unwrap_or_else(|| DEFAULT_USER_ID.to_string());
        let connect_timeout = var("STREAMCHAT_CONNECT_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map_or(
                Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
                Duration::from_secs,
            );
        let outbound_queue_limit = var("STREAMCHAT_QUEUE_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_LIMIT);

        Self {
            api_base,
            ws_base,
            user_id,
            connect_timeout,
            outbound_queue_limit,
        }
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// An `http(s)` API base becomes the matching `ws(s)` endpoint.
fn derive_ws_base(api_base: &str) -> String {
    if let Some(rest) = api_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_base.to_string()
    }
}
