//! A live, authenticated client connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use kinship_core::messages::Identity;
use kinship_core::{ConnectionId, ServerEvent, UserId};

/// Serialized outbound frame, shared between all recipients of a broadcast.
pub type Frame = Arc<str>;

pub struct ClientConnection {
    pub id: ConnectionId,
    /// Display metadata cached from the handshake.
    pub identity: Identity,
    tx: mpsc::Sender<Frame>,
    pub connected_at: Instant,
    last_seen: Mutex<Instant>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl ClientConnection {
    pub fn new(identity: Identity, tx: mpsc::Sender<Frame>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            identity,
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Queue a frame for the writer task. Never blocks: a full or closed
    /// queue drops the frame and returns `false`.
    pub fn send(&self, frame: Frame) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    connection_id = %self.id,
                    frame_len = frame.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match encode(event) {
            Some(frame) => self.send(frame),
            None => false,
        }
    }

    /// Record inbound activity (pong or any frame).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.identity.user_id)
            .finish_non_exhaustive()
    }
}

/// Serialize an event once so it can be fanned out as a shared frame.
pub fn encode(event: &ServerEvent) -> Option<Frame> {
    match event.to_frame() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use kinship_core::messages::PresenceNotice;

    #[test]
    fn send_event_queues_frame() {
        let (conn, mut rx) = connection(1, "Ada", 4);
        assert!(conn.send_event(&ServerEvent::UserOnline(PresenceNotice { user_id: UserId::new(2) })));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "user_online");
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (conn, _rx) = connection(1, "Ada", 1);
        assert!(conn.send(Arc::from("a")));
        assert!(!conn.send(Arc::from("b")));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_receiver_marks_connection_closed() {
        let (conn, rx) = connection(1, "Ada", 1);
        drop(rx);
        assert!(!conn.send(Arc::from("a")));
        assert!(conn.is_closed());
    }

    #[test]
    fn mark_alive_resets_idle() {
        let (conn, _rx) = connection(1, "Ada", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.idle_for() >= Duration::from_millis(5));
        conn.mark_alive();
        assert!(conn.idle_for() < Duration::from_millis(5));
    }

    #[test]
    fn ids_are_unique() {
        let (a, _ra) = connection(1, "Ada", 1);
        let (b, _rb) = connection(1, "Ada", 1);
        assert_ne!(a.id, b.id);
    }
}
