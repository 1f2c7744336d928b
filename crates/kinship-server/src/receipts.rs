//! Typing signals (transient room broadcasts) and read receipts (persisted,
//! then broadcast).

use std::sync::Arc;

use tracing::{debug, info, instrument};

use kinship_core::messages::{ReadReceipt, StopTypingNotice, TypingNotice};
use kinship_core::{ChatError, ConversationId, ServerEvent, UserId};

use crate::connection::ClientConnection;
use crate::directory::SessionDirectory;
use crate::rooms::RoomRegistry;
use crate::storage::StoreHandle;

pub struct ReceiptCoordinator {
    store: StoreHandle,
    rooms: Arc<RoomRegistry>,
    directory: Arc<SessionDirectory>,
}

impl ReceiptCoordinator {
    pub fn new(store: StoreHandle, rooms: Arc<RoomRegistry>, directory: Arc<SessionDirectory>) -> Self {
        Self {
            store,
            rooms,
            directory,
        }
    }

    /// Relay a typing start to the rest of the room. The origin must have
    /// joined the room, which already proved it participates.
    pub fn typing_start(&self, origin: &ClientConnection, conversation: ConversationId) -> Result<usize, ChatError> {
        self.require_joined(origin, conversation)?;
        let event = ServerEvent::UserTyping(TypingNotice {
            conversation_id: conversation,
            user_id: origin.user_id(),
            user_name: origin.identity.name.clone(),
        });
        Ok(self.rooms.broadcast(conversation, &event, Some(&origin.id)))
    }

    pub fn typing_stop(&self, origin: &ClientConnection, conversation: ConversationId) -> Result<usize, ChatError> {
        self.require_joined(origin, conversation)?;
        let event = ServerEvent::UserStopTyping(StopTypingNotice {
            conversation_id: conversation,
            user_id: origin.user_id(),
        });
        Ok(self.rooms.broadcast(conversation, &event, Some(&origin.id)))
    }

    fn require_joined(&self, origin: &ClientConnection, conversation: ConversationId) -> Result<(), ChatError> {
        if self.rooms.is_member(&origin.id, conversation) {
            Ok(())
        } else {
            Err(ChatError::validation(format!(
                "join conversation {conversation} before sending typing signals"
            )))
        }
    }

    /// Mark the peer's unread messages as read by `viewer`, then tell the
    /// room (and the viewer's own personal channel when it is not in the
    /// room). Returns the number of rows updated; repeating it is harmless.
    #[instrument(skip(self), fields(conversation_id = %conversation, viewer = %viewer))]
    pub async fn mark_read(&self, conversation: ConversationId, viewer: UserId) -> Result<usize, ChatError> {
        self.store.participants_of(conversation, viewer).await?;
        let marked = self
            .store
            .call(move |s| s.mark_conversation_read(conversation, viewer))
            .await?;

        let event = ServerEvent::MessagesRead(ReadReceipt {
            conversation_id: conversation,
            read_by: viewer,
        });
        let mut recipients = self.rooms.broadcast(conversation, &event, None);
        if let Some(own) = self.directory.lookup(viewer) {
            if !self.rooms.is_member(&own.id, conversation) && own.send_event(&event) {
                recipients += 1;
            }
        }

        if marked > 0 {
            info!(marked, recipients, "messages marked read");
        } else {
            debug!(recipients, "nothing new to mark read");
        }
        Ok(marked)
    }
}
