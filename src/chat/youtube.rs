//! YouTube Live chat via the YouTube Data API v3.
//!
//! - `liveBroadcasts.list` finds the active broadcast and its `liveChatId`
//! - `liveChatMessages.list` pages through chat messages
//! - `liveChatMessages.insert` posts a text message
//!
//! Every request carries the bearer token currently held by [`Credentials`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api::{ChatApi, ChatError, ChatMessage, MessagePage, Result};
use super::credentials::Credentials;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Live chat client.
pub struct YouTubeChat {
    client: Client,
    base_url: String,
    credentials: Arc<Credentials>,
}

impl YouTubeChat {
    pub fn new(credentials: Arc<Credentials>) -> Result<Self> {
        Self::with_base_url(credentials, API_BASE)
    }

    /// Point the client at a different API root (e.g. a local mock).
    pub fn with_base_url(credentials: Arc<Credentials>, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .gzip(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.credentials.bearer().ok_or(ChatError::Unauthorized)?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request)?.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChatError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send(request).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatApi for YouTubeChat {
    async fn active_chat_id(&self) -> Result<String> {
        let request = self.client.get(self.url("liveBroadcasts")).query(&[
            ("part", "snippet"),
            ("broadcastStatus", "active"),
            ("broadcastType", "all"),
        ]);
        let list: BroadcastList = self.json(request).await?;
        let chat_id = list.live_chat_id().ok_or(ChatError::NoActiveBroadcast)?;
        debug!("resolved live chat {}", chat_id);
        Ok(chat_id)
    }

    async fn list_messages(&self, chat_id: &str, page_token: Option<&str>) -> Result<MessagePage> {
        let mut request = self
            .client
            .get(self.url("liveChat/messages"))
            .query(&[("liveChatId", chat_id), ("part", "snippet,authorDetails")]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let list: MessageList = self.json(request).await?;
        Ok(list.into_page())
    }

    async fn insert_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let body = InsertMessage::text(chat_id, text);
        let request = self
            .client
            .post(self.url("liveChat/messages"))
            .query(&[("part", "snippet")])
            .json(&body);

        self.send(request).await?;
        debug!("posted chat message to {}", chat_id);
        Ok(())
    }
}

// ============================================================================
// YouTube Data API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct BroadcastList {
    #[serde(default)]
    items: Vec<Broadcast>,
}

impl BroadcastList {
    fn live_chat_id(self) -> Option<String> {
        self.items
            .into_iter()
            .find_map(|b| b.snippet.live_chat_id.filter(|id| !id.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct Broadcast {
    snippet: BroadcastSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastSnippet {
    live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    items: Vec<MessageItem>,
    next_page_token: Option<String>,
    polling_interval_millis: Option<u64>,
}

impl MessageList {
    fn into_page(self) -> MessagePage {
        MessagePage {
            messages: self.items.into_iter().map(MessageItem::into_message).collect(),
            next_page_token: self.next_page_token,
            polling_interval: self.polling_interval_millis.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageItem {
    id: String,
    snippet: MessageSnippet,
    author_details: AuthorDetails,
}

impl MessageItem {
    fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            author_name: self.author_details.display_name,
            text: self.snippet.display_message.unwrap_or_default(),
            is_moderator: self.author_details.is_chat_moderator,
            is_owner: self.author_details.is_chat_owner,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSnippet {
    display_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorDetails {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    is_chat_owner: bool,
    #[serde(default)]
    is_chat_moderator: bool,
}

#[derive(Debug, Serialize)]
struct InsertMessage<'a> {
    snippet: InsertSnippet<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertSnippet<'a> {
    live_chat_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text_message_details: TextMessageDetails<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextMessageDetails<'a> {
    message_text: &'a str,
}

impl<'a> InsertMessage<'a> {
    fn text(live_chat_id: &'a str, message_text: &'a str) -> Self {
        Self {
            snippet: InsertSnippet {
                live_chat_id,
                kind: "textMessageEvent",
                text_message_details: TextMessageDetails { message_text },
            },
        }
    }
}
