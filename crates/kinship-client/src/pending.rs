//! Outgoing messages awaiting their `new_message` echo.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use kinship_core::events::SendMessage;

pub const DEFAULT_ACK_WINDOW: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendState {
    Pending,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct PendingSend {
    pub request: SendMessage,
    pub sent_at: Instant,
    pub state: SendState,
}

/// Keyed by `clientMessageId`. There is no server-side ack beyond the echo:
/// an entry still pending after the window may or may not have been
/// persisted, so the UI should offer a resend rather than retry blindly.
#[derive(Clone, Debug)]
pub struct PendingSends {
    window: Duration,
    entries: HashMap<String, PendingSend>,
}

impl Default for PendingSends {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_WINDOW)
    }
}

impl PendingSends {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Track a send. Requests without a `clientMessageId` cannot be
    /// acknowledged and are not tracked.
    pub fn track(&mut self, request: SendMessage, now: Instant) -> bool {
        let Some(id) = request.client_message_id.clone() else {
            return false;
        };
        self.entries.insert(
            id,
            PendingSend {
                request,
                sent_at: now,
                state: SendState::Pending,
            },
        );
        true
    }

    /// The echo arrived; forget the entry.
    pub fn ack(&mut self, client_message_id: &str) -> Option<PendingSend> {
        self.entries.remove(client_message_id)
    }

    pub fn fail(&mut self, client_message_id: &str, reason: impl Into<String>) -> bool {
        match self.entries.get_mut(client_message_id) {
            Some(entry) => {
                entry.state = SendState::Failed(reason.into());
                true
            }
            None => false,
        }
    }

    /// Still-pending sends whose acknowledgement window has elapsed.
    pub fn uncertain(&self, now: Instant) -> Vec<&PendingSend> {
        let mut out: Vec<&PendingSend> = self
            .entries
            .values()
            .filter(|e| e.state == SendState::Pending && now.saturating_duration_since(e.sent_at) >= self.window)
            .collect();
        out.sort_by_key(|e| e.sent_at);
        out
    }

    pub fn failed(&self) -> Vec<&PendingSend> {
        self.entries
            .values()
            .filter(|e| matches!(e.state, SendState::Failed(_)))
            .collect()
    }

    pub fn get(&self, client_message_id: &str) -> Option<&PendingSend> {
        self.entries.get(client_message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
