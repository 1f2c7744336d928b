//! `ChatHub` owns the shared registries and the components built on them.
//! Transports (websocket, REST) only ever talk to the hub.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use kinship_core::messages::Identity;
use kinship_core::{ChatError, ConversationId, ServerEvent};
use kinship_store::ChatStore;

use crate::config::ServerConfig;
use crate::connection::{ClientConnection, Frame};
use crate::directory::SessionDirectory;
use crate::notify::NotificationRelay;
use crate::pipeline::MessagePipeline;
use crate::presence::PresenceBroadcaster;
use crate::receipts::ReceiptCoordinator;
use crate::rooms::RoomRegistry;
use crate::storage::StoreHandle;

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub history_limit: usize,
    pub max_body_chars: usize,
    pub max_send_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for HubConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            max_body_chars: config.max_body_chars,
            max_send_queue: config.max_send_queue,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub connections: usize,
    pub online_users: usize,
    pub rooms: usize,
}

pub struct ChatHub {
    config: HubConfig,
    store: StoreHandle,
    directory: Arc<SessionDirectory>,
    presence: PresenceBroadcaster,
    rooms: Arc<RoomRegistry>,
    pipeline: MessagePipeline,
    receipts: ReceiptCoordinator,
    notifications: NotificationRelay,
    started_at: Instant,
}

impl ChatHub {
    pub fn new(config: HubConfig, store: Arc<dyn ChatStore>) -> Self {
        let store = StoreHandle::new(store);
        let directory = Arc::new(SessionDirectory::new());
        let rooms = Arc::new(RoomRegistry::new(Arc::clone(&directory)));
        Self {
            presence: PresenceBroadcaster::new(Arc::clone(&directory)),
            pipeline: MessagePipeline::new(
                store.clone(),
                Arc::clone(&rooms),
                Arc::clone(&directory),
                config.max_body_chars,
            ),
            receipts: ReceiptCoordinator::new(store.clone(), Arc::clone(&rooms), Arc::clone(&directory)),
            notifications: NotificationRelay::new(store.clone(), Arc::clone(&directory)),
            config,
            store,
            directory,
            rooms,
            started_at: Instant::now(),
        }
    }

    /// Record the authenticated identity before any websocket traffic. A
    /// failure here refuses the connection.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn admit(&self, identity: &Identity) -> Result<(), ChatError> {
        let identity = identity.clone();
        self.store.call(move |s| s.upsert_user(&identity)).await
    }

    /// Register a new connection and announce its user. The returned
    /// receiver feeds the connection's writer.
    pub fn connect(&self, identity: Identity) -> (Arc<ClientConnection>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.config.max_send_queue);
        let conn = Arc::new(ClientConnection::new(identity, tx));
        let replaced = self.directory.connect(Arc::clone(&conn));
        let notified = self.presence.announce_online(conn.user_id(), &conn.id);
        info!(
            connection_id = %conn.id,
            user_id = %conn.user_id(),
            replaced = replaced.is_some(),
            notified,
            "client connected"
        );
        (conn, rx)
    }

    /// Tear down everything tied to the connection. Offline is only
    /// announced once the user has no connection left.
    pub async fn disconnect(&self, conn: &ClientConnection) {
        conn.mark_closed();
        let rooms_left = self.rooms.leave_all(&conn.id);
        let went_offline = self.directory.disconnect(conn);
        if went_offline {
            self.presence.announce_offline(conn.user_id(), &conn.id);
        }
        let user = conn.user_id();
        if let Err(e) = self.store.call(move |s| s.touch_last_active(user)).await {
            warn!(user_id = %user, error = %e, "failed to record last activity");
        }
        info!(
            connection_id = %conn.id,
            user_id = %user,
            rooms_left,
            went_offline,
            dropped_frames = conn.drop_count(),
            "client disconnected"
        );
    }

    /// Put the connection in the conversation's room and send it the
    /// recent history. The history goes to this connection only.
    #[instrument(skip_all, fields(connection_id = %conn.id, conversation_id = %conversation))]
    pub async fn join_chat(&self, conn: &ClientConnection, conversation: ConversationId) -> Result<usize, ChatError> {
        self.store.participants_of(conversation, conn.user_id()).await?;
        self.rooms.join(&conn.id, conversation);
        let limit = self.config.history_limit;
        let history = self.store.call(move |s| s.load_history(conversation, limit)).await?;
        let count = history.len();
        conn.send_event(&ServerEvent::ChatHistory(history));
        Ok(count)
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            uptime_secs: self.started_at.elapsed().as_secs(),
            connections: self.directory.connection_count(),
            online_users: self.directory.online_count(),
            rooms: self.rooms.room_count(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn receipts(&self) -> &ReceiptCoordinator {
        &self.receipts
    }

    pub fn notifications(&self) -> &NotificationRelay {
        &self.notifications
    }
}
