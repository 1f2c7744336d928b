use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::ids::{ConversationId, MessageId, UserId};

/// Verified identity claim attached to a connection at handshake time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl Identity {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}

/// A persisted chat message joined with its sender's display metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

/// Lightweight copy of a new message addressed to the recipient's personal
/// channel, independent of room membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    pub body: String,
    pub conversation_id: ConversationId,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for MessageNotification {
    fn from(m: &Message) -> Self {
        Self {
            message_id: m.id,
            sender_id: m.sender_id,
            sender_name: m.sender_name.clone(),
            sender_avatar: m.sender_avatar.clone(),
            body: m.body.clone(),
            conversation_id: m.conversation_id,
            timestamp: m.created_at,
        }
    }
}

/// The other participant of a conversation as seen by a viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerProfile {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

/// One row of a viewer's conversation list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub peer: PeerProfile,
    #[serde(default)]
    pub last_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub unread_count: u32,
}

/// The unordered participant pair of a conversation, stored low id first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participants {
    pub low: UserId,
    pub high: UserId,
}

impl Participants {
    /// Canonical ordering of two distinct users. Self-chat is rejected.
    pub fn canonical(a: UserId, b: UserId) -> Result<Self, ChatError> {
        if a == b {
            return Err(ChatError::validation("cannot open a conversation with yourself"));
        }
        Ok(if a < b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        })
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The participant that is not `user`, if `user` participates at all.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.low == user {
            Some(self.high)
        } else if self.high == user {
            Some(self.low)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: ConversationId,
    pub read_by: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingNotice {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestNotice {
    pub sender_id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trim a message body and enforce the length bound.
pub fn normalize_body(raw: &str, max_chars: usize) -> Result<String, ChatError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ChatError::validation("message body is empty"));
    }
    let chars = body.chars().count();
    if chars > max_chars {
        return Err(ChatError::validation(format!(
            "message body is {chars} characters, limit is {max_chars}"
        )));
    }
    Ok(body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message {
            id: MessageId::new(7),
            conversation_id: ConversationId::new(42),
            sender_id: UserId::new(2),
            body: "hello".into(),
            created_at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            is_read: false,
            sender_name: "Bea".into(),
            sender_avatar: None,
            client_message_id: Some("c-1".into()),
        }
    }

    #[test]
    fn normalize_trims() {
        assert_eq!(normalize_body("  hi there \n", 100).unwrap(), "hi there");
    }

    #[test]
    fn normalize_rejects_blank() {
        for raw in ["", "   ", "\n\t "] {
            let err = normalize_body(raw, 100).unwrap_err();
            assert!(matches!(err, ChatError::Validation(_)), "raw={raw:?}");
        }
    }

    #[test]
    fn normalize_counts_chars_not_bytes() {
        assert!(normalize_body("ééé", 3).is_ok());
        assert!(normalize_body("éééé", 3).is_err());
    }

    #[test]
    fn participants_canonical_order() {
        let p = Participants::canonical(UserId::new(9), UserId::new(4)).unwrap();
        assert_eq!(p.low, UserId::new(4));
        assert_eq!(p.high, UserId::new(9));
        assert_eq!(p, Participants::canonical(UserId::new(4), UserId::new(9)).unwrap());
    }

    #[test]
    fn participants_reject_self() {
        assert!(Participants::canonical(UserId::new(5), UserId::new(5)).is_err());
    }

    #[test]
    fn participants_other() {
        let p = Participants::canonical(UserId::new(1), UserId::new(2)).unwrap();
        assert_eq!(p.other(UserId::new(1)), Some(UserId::new(2)));
        assert_eq!(p.other(UserId::new(2)), Some(UserId::new(1)));
        assert_eq!(p.other(UserId::new(3)), None);
        assert!(!p.contains(UserId::new(3)));
    }

    #[test]
    fn message_wire_shape_is_camel_case() {
        let json = serde_json::to_value(sample_message()).unwrap();
        assert_eq!(json["conversationId"], 42);
        assert_eq!(json["senderId"], 2);
        assert_eq!(json["isRead"], false);
        assert_eq!(json["senderName"], "Bea");
        assert_eq!(json["clientMessageId"], "c-1");
        assert_eq!(json["createdAt"], "2026-03-01T10:00:00Z");
    }

    #[test]
    fn notification_carries_message_id() {
        let msg = sample_message();
        let note = MessageNotification::from(&msg);
        assert_eq!(note.message_id, msg.id);
        assert_eq!(note.timestamp, msg.created_at);
        assert_eq!(note.body, "hello");
    }
}
