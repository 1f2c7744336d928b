//! Recency-ordered conversation list with per-conversation unread counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kinship_core::messages::{ConversationSummary, PeerProfile};
use kinship_core::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub conversation_id: ConversationId,
    pub peer: PeerProfile,
    pub last_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub unread: u32,
}

impl From<ConversationSummary> for ConversationEntry {
    fn from(s: ConversationSummary) -> Self {
        Self {
            conversation_id: s.conversation_id,
            peer: s.peer,
            last_message: s.last_message,
            updated_at: s.updated_at,
            unread: s.unread_count,
        }
    }
}

/// Most recently active first.
#[derive(Clone, Debug, Default)]
pub struct ConversationList {
    entries: Vec<ConversationEntry>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Vec<ConversationSummary>) -> Self {
        let mut entries: Vec<ConversationEntry> = snapshot.into_iter().map(Into::into).collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Self { entries }
    }

    pub fn get(&self, id: ConversationId) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| e.conversation_id == id)
    }

    pub fn get_mut(&mut self, id: ConversationId) -> Option<&mut ConversationEntry> {
        self.entries.iter_mut().find(|e| e.conversation_id == id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.get(id).is_some()
    }

    pub fn unread(&self, id: ConversationId) -> u32 {
        self.get(id).map_or(0, |e| e.unread)
    }

    pub fn total_unread(&self) -> u32 {
        self.entries.iter().map(|e| e.unread).sum()
    }

    pub fn set_unread(&mut self, id: ConversationId, unread: u32) {
        if let Some(entry) = self.get_mut(id) {
            entry.unread = unread;
        }
    }

    /// Update the preview in place.
    pub fn set_preview(&mut self, id: ConversationId, body: &str, at: DateTime<Utc>) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.last_message = Some(body.to_owned());
                if at > entry.updated_at {
                    entry.updated_at = at;
                }
                true
            }
            None => false,
        }
    }

    /// Update the preview and move the conversation to the top. Unknown
    /// conversations are created from `peer`.
    pub fn bump(&mut self, id: ConversationId, peer: impl FnOnce() -> PeerProfile, body: &str, at: DateTime<Utc>) {
        let mut entry = match self.entries.iter().position(|e| e.conversation_id == id) {
            Some(index) => self.entries.remove(index),
            None => ConversationEntry {
                conversation_id: id,
                peer: peer(),
                last_message: None,
                updated_at: at,
                unread: 0,
            },
        };
        entry.last_message = Some(body.to_owned());
        if at > entry.updated_at {
            entry.updated_at = at;
        }
        self.entries.insert(0, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
