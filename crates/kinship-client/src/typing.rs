//! Typing indicators with a display expiry and stale-stop handling.
//!
//! Start and stop for the same user can arrive close together and, across
//! reconnects, out of order. A stop that lands within `suppression` of the
//! most recent start is not applied at once: it is deferred by
//! `suppression`, and a new start in that window cancels it. A stale stop
//! therefore cannot hide a live burst, and a genuine quick stop still
//! clears the indicator after `suppression` instead of at `expiry`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use kinship_core::{ConversationId, UserId};

pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(5);
pub const DEFAULT_SUPPRESSION: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
struct Typist {
    name: String,
    started: Instant,
    /// Deferred stop, see the module docs.
    stop_at: Option<Instant>,
}

#[derive(Clone, Debug)]
pub struct TypingIndicators {
    expiry: Duration,
    suppression: Duration,
    active: HashMap<(ConversationId, UserId), Typist>,
}

impl Default for TypingIndicators {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY, DEFAULT_SUPPRESSION)
    }
}

impl TypingIndicators {
    pub fn new(expiry: Duration, suppression: Duration) -> Self {
        Self {
            expiry,
            suppression,
            active: HashMap::new(),
        }
    }

    pub fn start(&mut self, conversation: ConversationId, user: UserId, name: &str, now: Instant) {
        self.active.insert(
            (conversation, user),
            Typist {
                name: name.to_owned(),
                started: now,
                stop_at: None,
            },
        );
    }

    /// Returns `true` if the indicator was cleared now, `false` if there was
    /// none or the stop was deferred.
    pub fn stop(&mut self, conversation: ConversationId, user: UserId, now: Instant) -> bool {
        let key = (conversation, user);
        match self.active.get_mut(&key) {
            Some(t) if now.saturating_duration_since(t.started) < self.suppression => {
                t.stop_at.get_or_insert(now);
                false
            }
            Some(_) => self.active.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn is_typing(&self, conversation: ConversationId, user: UserId, now: Instant) -> bool {
        self.active
            .get(&(conversation, user))
            .is_some_and(|t| self.live(t, now))
    }

    /// Display names of everyone currently typing in `conversation`.
    pub fn typing_in(&self, conversation: ConversationId, now: Instant) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .active
            .iter()
            .filter(|((c, _), t)| *c == conversation && self.live(t, now))
            .map(|(_, t)| t.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Drop expired indicators. Returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.active.len();
        let (expiry, suppression) = (self.expiry, self.suppression);
        self.active.retain(|_, t| is_live(t, now, expiry, suppression));
        before - self.active.len()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    fn live(&self, t: &Typist, now: Instant) -> bool {
        is_live(t, now, self.expiry, self.suppression)
    }
}

fn is_live(t: &Typist, now: Instant, expiry: Duration, suppression: Duration) -> bool {
    now.saturating_duration_since(t.started) < expiry
        && t.stop_at.map_or(true, |stop| now.saturating_duration_since(stop) < suppression)
}
