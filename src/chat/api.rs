//! The three chat operations the engagement scheduler consumes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Chat API errors. All of them are logged and retried on the next tick.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("no valid access token")]
    Unauthorized,

    #[error("no active broadcast with a live chat")]
    NoActiveBroadcast,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected chat API response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// One message from the live chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub author_name: String,
    pub text: String,
    pub is_moderator: bool,
    pub is_owner: bool,
}

impl ChatMessage {
    /// Written by a viewer rather than the channel owner or a moderator.
    #[must_use]
    pub fn is_human(&self) -> bool {
        !self.is_moderator && !self.is_owner
    }
}

/// A page of chat messages.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    /// Token to pass to the next call to receive only newer messages.
    pub next_page_token: Option<String>,
    /// Minimum wait the API asks for before the next poll.
    pub polling_interval: Option<Duration>,
}

/// Live chat backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Chat id of the currently active broadcast.
    async fn active_chat_id(&self) -> Result<String>;

    /// Messages newer than `page_token` (or the recent backlog if `None`).
    async fn list_messages(&self, chat_id: &str, page_token: Option<&str>) -> Result<MessagePage>;

    /// Post `text` into the chat.
    async fn insert_message(&self, chat_id: &str, text: &str) -> Result<()>;
}
