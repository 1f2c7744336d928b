//! Chat Room Registry: live connections grouped by the conversation they
//! are viewing. Room membership only governs room broadcasts; personal
//! channel delivery goes through the [`SessionDirectory`] regardless.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use kinship_core::{ConnectionId, ConversationId, ServerEvent};

use crate::connection::encode;
use crate::directory::SessionDirectory;

pub struct RoomRegistry {
    directory: Arc<SessionDirectory>,
    rooms: DashMap<ConversationId, HashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, HashSet<ConversationId>>,
}

impl RoomRegistry {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self {
            directory,
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Returns `true` if the connection was not already a member.
    pub fn join(&self, connection: &ConnectionId, conversation: ConversationId) -> bool {
        let added = self
            .rooms
            .entry(conversation)
            .or_default()
            .insert(connection.clone());
        self.memberships
            .entry(connection.clone())
            .or_default()
            .insert(conversation);
        if added {
            debug!(connection_id = %connection, conversation_id = %conversation, "joined room");
        }
        added
    }

    pub fn leave(&self, connection: &ConnectionId, conversation: ConversationId) -> bool {
        if let Some(mut rooms) = self.memberships.get_mut(connection) {
            rooms.remove(&conversation);
        }
        self.memberships.remove_if(connection, |_, rooms| rooms.is_empty());
        self.remove_member(conversation, connection)
    }

    /// Drop the connection from every room it joined. Returns how many.
    pub fn leave_all(&self, connection: &ConnectionId) -> usize {
        let Some((_, joined)) = self.memberships.remove(connection) else {
            return 0;
        };
        for conversation in &joined {
            self.remove_member(*conversation, connection);
        }
        joined.len()
    }

    fn remove_member(&self, conversation: ConversationId, connection: &ConnectionId) -> bool {
        let removed = self
            .rooms
            .get_mut(&conversation)
            .map(|mut members| members.remove(connection))
            .unwrap_or(false);
        self.rooms.remove_if(&conversation, |_, members| members.is_empty());
        removed
    }

    pub fn is_member(&self, connection: &ConnectionId, conversation: ConversationId) -> bool {
        self.rooms
            .get(&conversation)
            .is_some_and(|members| members.contains(connection))
    }

    pub fn members(&self, conversation: ConversationId) -> Vec<ConnectionId> {
        self.rooms
            .get(&conversation)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Send `event` to every connection in the room, optionally skipping
    /// one. Returns the number of connections it was queued on.
    pub fn broadcast(
        &self,
        conversation: ConversationId,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let members = self.members(conversation);
        if members.is_empty() {
            return 0;
        }
        let Some(frame) = encode(event) else {
            return 0;
        };
        let delivered = members
            .iter()
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| self.directory.connection(id))
            .filter(|conn| conn.send(Arc::clone(&frame)))
            .count();
        trace!(
            conversation_id = %conversation,
            event = event.name(),
            recipients = delivered,
            "room broadcast"
        );
        delivered
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
