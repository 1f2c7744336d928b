use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use kinship_core::ConversationId;

/// Conversation serials start at 1, so 0 marks an empty slot.
const NONE: i64 = 0;

/// Which conversation the user is looking at right now.
///
/// Cloned handles share one slot. Event handlers subscribe once and call
/// [`current`](Self::current) on every event instead of capturing the value
/// at subscription time.
#[derive(Clone, Debug, Default)]
pub struct ForegroundPanel {
    slot: Arc<AtomicI64>,
}

impl ForegroundPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, conversation: ConversationId) {
        self.slot.store(conversation.get(), Ordering::Release);
    }

    pub fn close(&self) {
        self.slot.store(NONE, Ordering::Release);
    }

    /// Close only if `conversation` is still the open one.
    pub fn close_if(&self, conversation: ConversationId) -> bool {
        self.slot
            .compare_exchange(conversation.get(), NONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn current(&self) -> Option<ConversationId> {
        match self.slot.load(Ordering::Acquire) {
            NONE => None,
            id => Some(ConversationId::new(id)),
        }
    }

    pub fn is_open(&self, conversation: ConversationId) -> bool {
        self.current() == Some(conversation)
    }
}
