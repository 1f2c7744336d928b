//! REST client for the snapshot and fallback endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use kinship_core::messages::{ConversationSummary, Message};
use kinship_core::{ConversationId, ErrorKind, UserId};

use crate::error::{ClientError, Result};
use crate::reconciler::ReadMarker;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub success: bool,
    pub marked_count: usize,
    pub conversation_id: ConversationId,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenChatResponse {
    conversation_id: ConversationId,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendStatus {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    pub online: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: Option<ErrorKind>,
    message: String,
}

/// Bearer-authenticated client for one user.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }

    /// Conversation snapshot used to rebuild state after (re)connecting.
    pub async fn list_chats(&self) -> Result<Vec<ConversationSummary>> {
        let resp = self.authed(self.http.get(self.url("/api/chats"))).send().await?;
        decode(resp).await
    }

    pub async fn open_chat(&self, other: UserId) -> Result<ConversationId> {
        let resp = self
            .authed(self.http.post(self.url("/api/chats")))
            .json(&json!({ "otherUserId": other }))
            .send()
            .await?;
        let body: OpenChatResponse = decode(resp).await?;
        Ok(body.conversation_id)
    }

    /// Latest messages, oldest first.
    pub async fn history(&self, conversation: ConversationId, limit: Option<usize>) -> Result<Vec<Message>> {
        let mut req = self.authed(self.http.get(self.url(&format!("/api/chats/{conversation}/messages"))));
        if let Some(limit) = limit {
            req = req.query(&[("limit", limit)]);
        }
        decode(req.send().await?).await
    }

    pub async fn mark_chat_read(&self, conversation: ConversationId) -> Result<MarkReadResponse> {
        let resp = self
            .authed(self.http.post(self.url(&format!("/api/chats/{conversation}/read"))))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn friends_presence(&self) -> Result<Vec<FriendStatus>> {
        let resp = self
            .authed(self.http.get(self.url("/api/presence/friends")))
            .send()
            .await?;
        decode(resp).await
    }
}

#[async_trait]
impl ReadMarker for ApiClient {
    async fn mark_read(&self, conversation: ConversationId) -> Result<usize> {
        let resp = self.mark_chat_read(conversation).await?;
        debug!(conversation_id = %conversation, marked = resp.marked_count, "marked read over http");
        Ok(resp.marked_count)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(rejected(status.as_u16(), &text))
}

fn rejected(status: u16, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => ClientError::Rejected {
            status,
            kind: env.error.kind,
            message: env.error.message,
        },
        Err(_) => ClientError::Rejected {
            status,
            kind: None,
            message: body.to_owned(),
        },
    }
}
