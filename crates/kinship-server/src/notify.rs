//! Notification Relay: out-of-band pushes to a user's personal channel.
//! The durable friend-request row is owned by the friend service; the push
//! is a convenience and is dropped when the recipient is offline.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use kinship_core::messages::FriendRequestNotice;
use kinship_core::{ChatError, ServerEvent, UserId};

use crate::directory::SessionDirectory;
use crate::storage::StoreHandle;

pub struct NotificationRelay {
    store: StoreHandle,
    directory: Arc<SessionDirectory>,
}

impl NotificationRelay {
    pub fn new(store: StoreHandle, directory: Arc<SessionDirectory>) -> Self {
        Self { store, directory }
    }

    /// Returns whether the push was queued.
    pub fn notify_friend_request(&self, recipient: UserId, notice: FriendRequestNotice) -> bool {
        match self
            .directory
            .send_to_user(recipient, &ServerEvent::NewFriendRequest(notice))
        {
            Ok(()) => true,
            Err(e) => {
                debug!(recipient_id = %recipient, error = %e, "friend request push dropped");
                false
            }
        }
    }

    /// Look up the sender's profile and push the request to `recipient`.
    pub async fn relay_friend_request(&self, sender: UserId, recipient: UserId) -> Result<bool, ChatError> {
        if sender == recipient {
            return Err(ChatError::validation("cannot send a friend request to yourself"));
        }
        let profile = self.store.call(move |s| s.user_profile(sender)).await?;
        let notice = FriendRequestNotice {
            sender_id: profile.user_id,
            name: profile.name,
            avatar_ref: profile.avatar_ref,
            timestamp: Utc::now(),
        };
        Ok(self.notify_friend_request(recipient, notice))
    }
}
