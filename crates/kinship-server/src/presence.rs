//! Online/offline announcements. Best effort: a dropped announce is never
//! re-sent, the durable `last_active_at` column is the corroborating source.

use std::sync::Arc;

use tracing::debug;

use kinship_core::messages::PresenceNotice;
use kinship_core::{ConnectionId, ServerEvent, UserId};

use crate::connection::encode;
use crate::directory::SessionDirectory;

pub struct PresenceBroadcaster {
    directory: Arc<SessionDirectory>,
}

impl PresenceBroadcaster {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }

    /// Tell every other live connection that `user` came online.
    pub fn announce_online(&self, user: UserId, origin: &ConnectionId) -> usize {
        self.announce(ServerEvent::UserOnline(PresenceNotice { user_id: user }), origin)
    }

    pub fn announce_offline(&self, user: UserId, origin: &ConnectionId) -> usize {
        self.announce(ServerEvent::UserOffline(PresenceNotice { user_id: user }), origin)
    }

    fn announce(&self, event: ServerEvent, origin: &ConnectionId) -> usize {
        let Some(frame) = encode(&event) else {
            return 0;
        };
        let recipients = self.directory.broadcast_except(&frame, origin);
        debug!(event = event.name(), connection_id = %origin, recipients, "presence announced");
        recipients
    }
}
