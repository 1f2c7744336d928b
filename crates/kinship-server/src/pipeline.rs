//! Message Pipeline: validate, persist, then deliver over two independent
//! sinks (the conversation room and the recipient's personal channel).
//!
//! Nothing is broadcast unless the write succeeded. After a successful write
//! delivery is best effort; a client that misses an event recovers through
//! a history reload, never through redelivery.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use kinship_core::events::SendMessage;
use kinship_core::messages::{normalize_body, Identity, Message, MessageNotification};
use kinship_core::{ChatError, ServerEvent};

use crate::directory::SessionDirectory;
use crate::rooms::RoomRegistry;
use crate::storage::StoreHandle;

pub struct MessagePipeline {
    store: StoreHandle,
    rooms: Arc<RoomRegistry>,
    directory: Arc<SessionDirectory>,
    max_body_chars: usize,
}

/// Where a sent message ended up.
#[derive(Debug)]
pub struct Delivery {
    pub message: Message,
    pub room_recipients: usize,
    pub notified: bool,
}

impl MessagePipeline {
    pub fn new(
        store: StoreHandle,
        rooms: Arc<RoomRegistry>,
        directory: Arc<SessionDirectory>,
        max_body_chars: usize,
    ) -> Self {
        Self {
            store,
            rooms,
            directory,
            max_body_chars,
        }
    }

    #[instrument(
        skip_all,
        fields(sender_id = %sender.user_id, conversation_id = %request.conversation_id)
    )]
    pub async fn send_message(&self, sender: &Identity, request: SendMessage) -> Result<Delivery, ChatError> {
        let body = normalize_body(&request.body, self.max_body_chars)?;
        let conversation = request.conversation_id;

        let participants = self.store.participants_of(conversation, sender.user_id).await?;
        if participants.other(sender.user_id) != Some(request.recipient_id) {
            return Err(ChatError::validation(format!(
                "user {} is not the other participant of conversation {conversation}",
                request.recipient_id
            )));
        }

        let sender_id = sender.user_id;
        let mut message = self
            .store
            .call(move |s| s.insert_message(conversation, sender_id, &body))
            .await?;
        message.client_message_id = request.client_message_id;

        let room_recipients = self
            .rooms
            .broadcast(conversation, &ServerEvent::NewMessage(message.clone()), None);

        let notification = ServerEvent::NewMessageNotification(MessageNotification::from(&message));
        let notified = match self.directory.send_to_user(request.recipient_id, &notification) {
            Ok(()) => true,
            Err(e) => {
                debug!(recipient_id = %request.recipient_id, error = %e, "personal channel miss");
                false
            }
        };

        let preview = message.body.clone();
        if let Err(e) = self
            .store
            .call(move |s| s.touch_conversation(conversation, &preview))
            .await
        {
            warn!(error = %e, "failed to update conversation summary");
        }

        info!(message_id = %message.id, room_recipients, notified, "message delivered");
        Ok(Delivery {
            message,
            room_recipients,
            notified,
        })
    }
}
