//! Wire protocol. Every frame in either direction is a JSON text frame of
//! the form `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::errors::{ChatError, ErrorKind};
use crate::ids::{ConversationId, UserId};
use crate::messages::{
    FriendRequestNotice, Message, MessageNotification, PresenceNotice, ReadReceipt,
    StopTypingNotice, TypingNotice,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: ConversationId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub conversation_id: ConversationId,
    pub body: String,
    pub recipient_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub recipient_id: UserId,
}

/// Events sent by a client over its connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinChat(ConversationRef),
    SendMessage(SendMessage),
    Typing(ConversationRef),
    StopTyping(ConversationRef),
    MarkMessagesRead(ConversationRef),
    SendFriendRequest(FriendRequest),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat(_) => "join_chat",
            Self::SendMessage(_) => "send_message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop_typing",
            Self::MarkMessagesRead(_) => "mark_messages_read",
            Self::SendFriendRequest(_) => "send_friend_request",
        }
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::JoinChat(r) | Self::Typing(r) | Self::StopTyping(r) | Self::MarkMessagesRead(r) => {
                Some(r.conversation_id)
            }
            Self::SendMessage(m) => Some(m.conversation_id),
            Self::SendFriendRequest(_) => None,
        }
    }

    /// Parse an inbound text frame. Malformed JSON and unknown event names
    /// are both validation failures.
    pub fn from_frame(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text).map_err(|e| ChatError::validation(format!("malformed frame: {e}")))
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Per-connection failure report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    /// Name of the client event that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

impl ErrorEvent {
    pub fn from_error(err: &ChatError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            conversation_id: None,
            client_message_id: None,
            request: None,
        }
    }

    /// Attach the request context of the client event that failed.
    pub fn for_request(mut self, event: &ClientEvent) -> Self {
        self.request = Some(event.name().to_owned());
        self.conversation_id = event.conversation_id();
        if let ClientEvent::SendMessage(m) = event {
            self.client_message_id = m.client_message_id.clone();
        }
        self
    }
}

/// Events emitted by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatHistory(Vec<Message>),
    NewMessage(Message),
    NewMessageNotification(MessageNotification),
    UserTyping(TypingNotice),
    UserStopTyping(StopTypingNotice),
    MessagesRead(ReadReceipt),
    UserOnline(PresenceNotice),
    UserOffline(PresenceNotice),
    NewFriendRequest(FriendRequestNotice),
    Error(ErrorEvent),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatHistory(_) => "chat_history",
            Self::NewMessage(_) => "new_message",
            Self::NewMessageNotification(_) => "new_message_notification",
            Self::UserTyping(_) => "user_typing",
            Self::UserStopTyping(_) => "user_stop_typing",
            Self::MessagesRead(_) => "messages_read",
            Self::UserOnline(_) => "user_online",
            Self::UserOffline(_) => "user_offline",
            Self::NewFriendRequest(_) => "new_friend_request",
            Self::Error(_) => "error",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<ErrorEvent> for ServerEvent {
    fn from(e: ErrorEvent) -> Self {
        Self::Error(e)
    }
}
