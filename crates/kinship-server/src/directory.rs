//! Session Directory: which live connection a user is reachable on.
//!
//! One routing entry per user; the most recent connect wins. Route changes
//! happen under the user's entry lock. When the routed connection leaves,
//! the route falls back to the user's newest remaining connection, so the
//! user only goes offline once their last connection is gone.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use kinship_core::{ChatError, ConnectionId, ServerEvent, UserId};

use crate::connection::{encode, ClientConnection, Frame};

#[derive(Default)]
pub struct SessionDirectory {
    routes: DashMap<UserId, ConnectionId>,
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly authenticated connection and route its user to it.
    /// Returns the connection it replaced as the user's route, if any.
    pub fn connect(&self, conn: Arc<ClientConnection>) -> Option<ConnectionId> {
        let user = conn.user_id();
        let id = conn.id.clone();
        self.connections.insert(id.clone(), conn);
        self.register(user, id)
    }

    /// Forget a connection. Returns `true` if the user has no connection
    /// left and just became unreachable.
    pub fn disconnect(&self, conn: &ClientConnection) -> bool {
        self.connections.remove(&conn.id);
        self.unregister(conn.user_id(), &conn.id)
    }

    pub fn register(&self, user: UserId, connection: ConnectionId) -> Option<ConnectionId> {
        let replaced = self.routes.insert(user, connection.clone());
        if let Some(old) = &replaced {
            debug!(user_id = %user, replaced = %old, connection_id = %connection, "route replaced");
        }
        replaced
    }

    /// Drop the user's route if it points at `connection`, re-pointing it at
    /// another live connection of the same user when there is one. Returns
    /// `true` only when the route was removed.
    pub fn unregister(&self, user: UserId, connection: &ConnectionId) -> bool {
        let Entry::Occupied(mut route) = self.routes.entry(user) else {
            return false;
        };
        if route.get() != connection {
            return false;
        }
        match self.fallback_route(user, connection) {
            Some(next) => {
                debug!(user_id = %user, closed = %connection, connection_id = %next, "route moved to remaining connection");
                route.insert(next);
                false
            }
            None => {
                route.remove();
                true
            }
        }
    }

    /// Newest open connection of `user` other than `leaving`.
    fn fallback_route(&self, user: UserId, leaving: &ConnectionId) -> Option<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.key() != leaving && c.user_id() == user && !c.is_closed())
            .map(|c| c.key().clone())
            .max()
    }

    pub fn lookup(&self, user: UserId) -> Option<Arc<ClientConnection>> {
        let id = self.routes.get(&user)?.value().clone();
        self.connection(&id)
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.routes.contains_key(&user)
    }

    /// Deliver to the user's personal channel. A miss is a soft failure.
    pub fn send_to_user(&self, user: UserId, event: &ServerEvent) -> Result<(), ChatError> {
        let conn = self.lookup(user).ok_or(ChatError::DeliveryMiss { user_id: user })?;
        let frame = encode(event).ok_or(ChatError::DeliveryMiss { user_id: user })?;
        if conn.send(frame) {
            Ok(())
        } else {
            Err(ChatError::DeliveryMiss { user_id: user })
        }
    }

    /// Send a frame to every live connection except `except`. Returns the
    /// number of connections the frame was queued on.
    pub fn broadcast_except(&self, frame: &Frame, except: &ConnectionId) -> usize {
        let targets: Vec<Arc<ClientConnection>> = self
            .connections
            .iter()
            .filter(|entry| entry.key() != except)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        targets.iter().filter(|c| c.send(Arc::clone(frame))).count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn online_count(&self) -> usize {
        self.routes.len()
    }
}
