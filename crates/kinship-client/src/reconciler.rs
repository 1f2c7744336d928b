//! Client Reconciliation State Machine.
//!
//! Keeps the locally cached conversation list, unread counters and presence
//! badges consistent with the server when events arrive duplicated (room and
//! personal channel), reordered, or not at all. Every server event goes
//! through [`Reconciler::apply`]. After a reconnect the cache is rebuilt from
//! a fresh snapshot with [`Reconciler::reconnect`], never patched.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use kinship_core::events::{ConversationRef, ErrorEvent, SendMessage};
use kinship_core::messages::{ConversationSummary, FriendRequestNotice, Message, MessageNotification, PeerProfile};
use kinship_core::{ClientEvent, ConversationId, MessageId, ServerEvent, UserId};

use crate::conversations::ConversationList;
use crate::error::Result;
use crate::foreground::ForegroundPanel;
use crate::pending::PendingSends;
use crate::typing::TypingIndicators;

/// Request/response path for marking a conversation read (HTTP fallback).
#[async_trait]
pub trait ReadMarker: Send + Sync {
    /// Returns the number of messages the server marked.
    async fn mark_read(&self, conversation: ConversationId) -> Result<usize>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    /// Second copy of a message already counted.
    Duplicate,
    /// A peer message landed in the open conversation; the caller should
    /// mark it read on the server.
    MarkRead(ConversationId),
    Ignored,
}

/// A new message as seen through either delivery path.
struct Incoming<'a> {
    id: MessageId,
    conversation: ConversationId,
    sender: UserId,
    sender_name: &'a str,
    sender_avatar: Option<&'a str>,
    body: &'a str,
    at: DateTime<Utc>,
    client_message_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for Incoming<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            id: m.id,
            conversation: m.conversation_id,
            sender: m.sender_id,
            sender_name: &m.sender_name,
            sender_avatar: m.sender_avatar.as_deref(),
            body: &m.body,
            at: m.created_at,
            client_message_id: m.client_message_id.as_deref(),
        }
    }
}

impl<'a> From<&'a MessageNotification> for Incoming<'a> {
    fn from(n: &'a MessageNotification) -> Self {
        Self {
            id: n.message_id,
            conversation: n.conversation_id,
            sender: n.sender_id,
            sender_name: &n.sender_name,
            sender_avatar: n.sender_avatar.as_deref(),
            body: &n.body,
            at: n.timestamp,
            client_message_id: None,
        }
    }
}

/// How many recent message ids are remembered for deduplication. Both
/// copies of a message are queued by the same send, so they arrive well
/// within this window.
pub const SEEN_WINDOW: usize = 1024;

/// Insertion-ordered set of recent message ids, capped at `cap`.
struct SeenIds {
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
    cap: usize,
}

impl SeenIds {
    fn new(cap: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(cap.min(SEEN_WINDOW)),
            ids: HashSet::new(),
            cap: cap.max(1),
        }
    }

    /// Returns `false` if `id` was already seen.
    fn insert(&mut self, id: MessageId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

pub struct Reconciler {
    me: UserId,
    list: ConversationList,
    foreground: ForegroundPanel,
    seen: SeenIds,
    /// Unread value before an optimistic zero, until the server confirms.
    pending_reads: HashMap<ConversationId, u32>,
    latest_own: HashMap<ConversationId, MessageId>,
    peer_read_up_to: HashMap<ConversationId, MessageId>,
    online: HashSet<UserId>,
    typing: TypingIndicators,
    sends: PendingSends,
    friend_requests: Vec<FriendRequestNotice>,
}

impl Reconciler {
    pub fn new(me: UserId, snapshot: Vec<ConversationSummary>) -> Self {
        Self::with_parts(me, snapshot, ForegroundPanel::new(), TypingIndicators::default(), PendingSends::default())
    }

    pub fn with_parts(
        me: UserId,
        snapshot: Vec<ConversationSummary>,
        foreground: ForegroundPanel,
        typing: TypingIndicators,
        sends: PendingSends,
    ) -> Self {
        Self {
            me,
            list: ConversationList::from_snapshot(snapshot),
            foreground,
            seen: SeenIds::new(SEEN_WINDOW),
            pending_reads: HashMap::new(),
            latest_own: HashMap::new(),
            peer_read_up_to: HashMap::new(),
            online: HashSet::new(),
            typing,
            sends,
            friend_requests: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: &ServerEvent, now: Instant) -> Outcome {
        trace!(event = event.name(), "reconcile");
        match event {
            ServerEvent::NewMessage(m) => self.on_message(Incoming::from(m)),
            ServerEvent::NewMessageNotification(n) => self.on_message(Incoming::from(n)),
            ServerEvent::ChatHistory(history) => self.on_history(history),
            ServerEvent::MessagesRead(r) => self.on_read(r.conversation_id, r.read_by),
            ServerEvent::Error(e) => self.on_error(e),
            ServerEvent::UserOnline(p) => {
                self.online.insert(p.user_id);
                Outcome::Updated
            }
            ServerEvent::UserOffline(p) => {
                self.online.remove(&p.user_id);
                Outcome::Updated
            }
            ServerEvent::UserTyping(t) => {
                self.typing.start(t.conversation_id, t.user_id, &t.user_name, now);
                Outcome::Updated
            }
            ServerEvent::UserStopTyping(t) => {
                if self.typing.stop(t.conversation_id, t.user_id, now) {
                    Outcome::Updated
                } else {
                    Outcome::Ignored
                }
            }
            ServerEvent::NewFriendRequest(f) => {
                self.friend_requests.push(f.clone());
                Outcome::Updated
            }
        }
    }

    fn on_message(&mut self, m: Incoming<'_>) -> Outcome {
        if !self.seen.insert(m.id) {
            return Outcome::Duplicate;
        }

        if m.sender == self.me {
            if let Some(id) = m.client_message_id {
                self.sends.ack(id);
            }
            self.note_own(m.conversation, m.id);
            return if self.list.set_preview(m.conversation, m.body, m.at) {
                Outcome::Updated
            } else {
                debug!(conversation_id = %m.conversation, "echo for unknown conversation");
                Outcome::Ignored
            };
        }

        let (sender, name, avatar) = (m.sender, m.sender_name, m.sender_avatar);
        self.list.bump(
            m.conversation,
            || PeerProfile {
                user_id: sender,
                name: name.to_owned(),
                avatar_ref: avatar.map(str::to_owned),
            },
            m.body,
            m.at,
        );
        if self.foreground.is_open(m.conversation) {
            return Outcome::MarkRead(m.conversation);
        }
        if let Some(entry) = self.list.get_mut(m.conversation) {
            entry.unread = entry.unread.saturating_add(1);
        }
        Outcome::Updated
    }

    fn on_history(&mut self, history: &[Message]) -> Outcome {
        for m in history {
            self.seen.insert(m.id);
            if m.sender_id == self.me {
                self.note_own(m.conversation_id, m.id);
            }
        }
        Outcome::Updated
    }

    fn on_read(&mut self, conversation: ConversationId, read_by: UserId) -> Outcome {
        if read_by == self.me {
            if self.pending_reads.remove(&conversation).is_none() {
                // Read from another surface.
                self.list.set_unread(conversation, 0);
            }
            return Outcome::Updated;
        }
        match self.latest_own.get(&conversation) {
            Some(&own) => {
                self.peer_read_up_to.insert(conversation, own);
                Outcome::Updated
            }
            None => Outcome::Ignored,
        }
    }

    fn on_error(&mut self, e: &ErrorEvent) -> Outcome {
        if let Some(id) = e.client_message_id.as_deref() {
            if self.sends.fail(id, e.message.clone()) {
                return Outcome::Updated;
            }
        }
        match (e.request.as_deref(), e.conversation_id) {
            (Some("mark_messages_read"), Some(conversation)) => {
                if self.rollback_read(conversation) {
                    Outcome::Updated
                } else {
                    Outcome::Ignored
                }
            }
            _ => {
                debug!(kind = e.kind.as_str(), message = %e.message, "server reported error");
                Outcome::Ignored
            }
        }
    }

    fn note_own(&mut self, conversation: ConversationId, id: MessageId) {
        let latest = self.latest_own.entry(conversation).or_insert(id);
        if id > *latest {
            *latest = id;
        }
    }

    /// Messages that arrived while the read was in flight stay counted.
    fn rollback_read(&mut self, conversation: ConversationId) -> bool {
        let Some(prior) = self.pending_reads.remove(&conversation) else {
            return false;
        };
        let current = self.list.unread(conversation);
        self.list.set_unread(conversation, prior.saturating_add(current));
        true
    }

    /// Optimistically zero the counter and return the frame that asks the
    /// server to persist it. Confirmed by our own `messages_read`, rolled
    /// back by an `error` for the request.
    pub fn begin_read(&mut self, conversation: ConversationId) -> ClientEvent {
        let current = self.list.unread(conversation);
        *self.pending_reads.entry(conversation).or_insert(0) += current;
        self.list.set_unread(conversation, 0);
        ClientEvent::MarkMessagesRead(ConversationRef {
            conversation_id: conversation,
        })
    }

    /// Bring a conversation to the foreground over the socket.
    pub fn open(&mut self, conversation: ConversationId) -> ClientEvent {
        self.foreground.open(conversation);
        self.begin_read(conversation)
    }

    /// Bring a conversation to the foreground and mark it read through
    /// `marker`, rolling the counter back if that fails.
    pub async fn open_conversation(&mut self, conversation: ConversationId, marker: &dyn ReadMarker) -> Result<usize> {
        self.foreground.open(conversation);
        self.begin_read(conversation);
        match marker.mark_read(conversation).await {
            Ok(marked) => {
                self.pending_reads.remove(&conversation);
                Ok(marked)
            }
            Err(e) => {
                self.rollback_read(conversation);
                Err(e)
            }
        }
    }

    pub fn close(&mut self) {
        self.foreground.close();
    }

    /// Record an outgoing message and return the frame to send.
    pub fn send(&mut self, request: SendMessage, now: Instant) -> ClientEvent {
        self.sends.track(request.clone(), now);
        ClientEvent::SendMessage(request)
    }

    /// Discard every cached counter and transient state and rebuild from a
    /// fresh snapshot. Pending sends survive; they surface as uncertain.
    pub fn reconnect(&mut self, snapshot: Vec<ConversationSummary>) {
        self.list = ConversationList::from_snapshot(snapshot);
        self.seen.clear();
        self.pending_reads.clear();
        self.latest_own.clear();
        self.peer_read_up_to.clear();
        self.online.clear();
        self.typing.clear();
        debug!(conversations = self.list.len(), "state rebuilt after reconnect");
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn conversations(&self) -> &ConversationList {
        &self.list
    }

    pub fn unread(&self, conversation: ConversationId) -> u32 {
        self.list.unread(conversation)
    }

    pub fn total_unread(&self) -> u32 {
        self.list.total_unread()
    }

    pub fn pending_read(&self, conversation: ConversationId) -> Option<u32> {
        self.pending_reads.get(&conversation).copied()
    }

    pub fn peer_read_up_to(&self, conversation: ConversationId) -> Option<MessageId> {
        self.peer_read_up_to.get(&conversation).copied()
    }

    /// Handle for UI code; clones share the slot.
    pub fn foreground(&self) -> ForegroundPanel {
        self.foreground.clone()
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    pub fn typing(&self) -> &TypingIndicators {
        &self.typing
    }

    pub fn typing_mut(&mut self) -> &mut TypingIndicators {
        &mut self.typing
    }

    pub fn sends(&self) -> &PendingSends {
        &self.sends
    }

    pub fn friend_requests(&self) -> &[FriendRequestNotice] {
        &self.friend_requests
    }

    /// Hand the collected friend requests to the caller and forget them.
    pub fn take_friend_requests(&mut self) -> Vec<FriendRequestNotice> {
        std::mem::take(&mut self.friend_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use kinship_core::messages::{PresenceNotice, ReadReceipt, StopTypingNotice, TypingNotice};
    use kinship_core::ErrorKind;

    use crate::error::ClientError;

    const ME: UserId = UserId::new(1);
    const PEER: UserId = UserId::new(2);
    const CONV: ConversationId = ConversationId::new(10);
    const OTHER: ConversationId = ConversationId::new(11);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn summary(id: ConversationId, peer: i64, unread: u32, updated: i64) -> ConversationSummary {
        ConversationSummary {
            conversation_id: id,
            peer: PeerProfile {
                user_id: UserId::new(peer),
                name: format!("peer{peer}"),
                avatar_ref: None,
            },
            last_message: None,
            updated_at: at(updated),
            unread_count: unread,
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(ME, vec![summary(CONV, 2, 0, 10), summary(OTHER, 3, 0, 20)])
    }

    fn message(id: i64, conv: ConversationId, sender: UserId, client_id: Option<&str>) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: conv,
            sender_id: sender,
            body: format!("m{id}"),
            created_at: at(100 + id),
            is_read: false,
            sender_name: "someone".into(),
            sender_avatar: None,
            client_message_id: client_id.map(str::to_owned),
        }
    }

    fn room(m: &Message) -> ServerEvent {
        ServerEvent::NewMessage(m.clone())
    }

    fn personal(m: &Message) -> ServerEvent {
        ServerEvent::NewMessageNotification(MessageNotification::from(m))
    }

    fn read_by(user: UserId) -> ServerEvent {
        ServerEvent::MessagesRead(ReadReceipt {
            conversation_id: CONV,
            read_by: user,
        })
    }

    fn mark_read_error() -> ServerEvent {
        ServerEvent::Error(ErrorEvent {
            kind: ErrorKind::Persistence,
            message: "persistence failed: disk full".into(),
            conversation_id: Some(CONV),
            client_message_id: None,
            request: Some("mark_messages_read".into()),
        })
    }

    struct FakeMarker {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeMarker {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReadMarker for FakeMarker {
        async fn mark_read(&self, _conversation: ConversationId) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ClientError::Rejected {
                    status: 500,
                    kind: Some(ErrorKind::Persistence),
                    message: "db down".into(),
                })
            } else {
                Ok(3)
            }
        }
    }

    #[test]
    fn dual_delivery_counts_once_in_either_order() {
        let now = Instant::now();
        let m = message(1, CONV, PEER, None);

        let mut room_first = reconciler();
        assert_eq!(room_first.apply(&room(&m), now), Outcome::Updated);
        assert_eq!(room_first.apply(&personal(&m), now), Outcome::Duplicate);

        let mut personal_first = reconciler();
        assert_eq!(personal_first.apply(&personal(&m), now), Outcome::Updated);
        assert_eq!(personal_first.apply(&room(&m), now), Outcome::Duplicate);

        assert_eq!(room_first.unread(CONV), 1);
        assert_eq!(personal_first.unread(CONV), 1);
    }

    #[test]
    fn peer_message_moves_conversation_to_top() {
        let mut r = reconciler();
        let first = |r: &Reconciler| r.conversations().iter().next().unwrap().conversation_id;
        assert_eq!(first(&r), OTHER);
        r.apply(&personal(&message(1, CONV, PEER, None)), Instant::now());
        assert_eq!(first(&r), CONV);
        assert_eq!(r.conversations().get(CONV).unwrap().last_message.as_deref(), Some("m1"));
    }

    #[test]
    fn foreground_message_asks_for_read_instead_of_counting() {
        let mut r = reconciler();
        r.open(CONV);
        let outcome = r.apply(&room(&message(1, CONV, PEER, None)), Instant::now());
        assert_eq!(outcome, Outcome::MarkRead(CONV));
        assert_eq!(r.unread(CONV), 0);
    }

    #[test]
    fn foreground_is_read_fresh_on_every_event() {
        let mut r = reconciler();
        let ui = r.foreground();
        ui.open(CONV);
        ui.open(OTHER);
        r.apply(&room(&message(1, CONV, PEER, None)), Instant::now());
        assert_eq!(r.unread(CONV), 1);
    }

    #[test]
    fn own_echo_acks_pending_send_without_unread() {
        let mut r = reconciler();
        let now = Instant::now();
        let frame = r.send(
            SendMessage {
                conversation_id: OTHER,
                body: "m5".into(),
                recipient_id: UserId::new(3),
                client_message_id: Some("tmp-1".into()),
            },
            now,
        );
        assert_eq!(frame.name(), "send_message");
        assert_eq!(r.sends().len(), 1);

        r.apply(&room(&message(5, OTHER, ME, Some("tmp-1"))), now);
        assert!(r.sends().is_empty());
        assert_eq!(r.unread(OTHER), 0);
        assert_eq!(r.conversations().get(OTHER).unwrap().last_message.as_deref(), Some("m5"));
    }

    #[test]
    fn send_error_marks_pending_failed() {
        let mut r = reconciler();
        let now = Instant::now();
        r.send(
            SendMessage {
                conversation_id: CONV,
                body: " ".into(),
                recipient_id: PEER,
                client_message_id: Some("tmp-2".into()),
            },
            now,
        );
        let error = ServerEvent::Error(ErrorEvent {
            kind: ErrorKind::Validation,
            message: "invalid request: message body is empty".into(),
            conversation_id: Some(CONV),
            client_message_id: Some("tmp-2".into()),
            request: Some("send_message".into()),
        });
        assert_eq!(r.apply(&error, now), Outcome::Updated);
        assert_eq!(r.sends().failed().len(), 1);
    }

    #[test]
    fn optimistic_read_confirmed_by_own_receipt() {
        let mut r = Reconciler::new(ME, vec![summary(CONV, 2, 4, 10)]);
        let frame = r.open(CONV);
        assert_eq!(frame.name(), "mark_messages_read");
        assert_eq!(r.unread(CONV), 0);
        assert_eq!(r.pending_read(CONV), Some(4));

        r.apply(&read_by(ME), Instant::now());
        assert_eq!(r.pending_read(CONV), None);
        assert_eq!(r.unread(CONV), 0);
    }

    #[test]
    fn failed_read_rolls_back() {
        let mut r = Reconciler::new(ME, vec![summary(CONV, 2, 4, 10)]);
        r.begin_read(CONV);
        assert_eq!(r.apply(&mark_read_error(), Instant::now()), Outcome::Updated);
        assert_eq!(r.unread(CONV), 4);
        assert_eq!(r.pending_read(CONV), None);
        assert_eq!(r.apply(&mark_read_error(), Instant::now()), Outcome::Ignored);
    }

    #[test]
    fn read_on_another_surface_zeroes_counter() {
        let mut r = Reconciler::new(ME, vec![summary(CONV, 2, 7, 10)]);
        r.apply(&read_by(ME), Instant::now());
        assert_eq!(r.unread(CONV), 0);
        r.apply(&read_by(ME), Instant::now());
        assert_eq!(r.unread(CONV), 0);
    }

    #[test]
    fn peer_receipt_leaves_my_counter() {
        let mut r = Reconciler::new(ME, vec![summary(CONV, 2, 2, 10)]);
        let now = Instant::now();
        assert_eq!(r.apply(&read_by(PEER), now), Outcome::Ignored);

        r.apply(&room(&message(8, CONV, ME, None)), now);
        r.apply(&read_by(PEER), now);
        assert_eq!(r.unread(CONV), 2);
        assert_eq!(r.peer_read_up_to(CONV), Some(MessageId::new(8)));
    }

    #[tokio::test]
    async fn open_conversation_over_http() {
        let mut r = Reconciler::new(ME, vec![summary(CONV, 2, 3, 10)]);
        let marker = FakeMarker::new(false);
        assert_eq!(r.open_conversation(CONV, &marker).await.unwrap(), 3);
        assert_eq!(r.unread(CONV), 0);
        assert_eq!(r.pending_read(CONV), None);
        assert!(r.foreground().is_open(CONV));

        // The broadcast copy of the same read arrives afterwards.
        r.apply(&read_by(ME), Instant::now());
        assert_eq!(r.unread(CONV), 0);
    }

    #[tokio::test]
    async fn open_conversation_rolls_back_on_failure() {
        let mut r = Reconciler::new(ME, vec![summary(CONV, 2, 3, 10)]);
        let marker = FakeMarker::new(true);
        let err = r.open_conversation(CONV, &marker).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(r.unread(CONV), 3);
        assert_eq!(marker.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn presence_and_typing() {
        let mut r = reconciler();
        let now = Instant::now();
        r.apply(&ServerEvent::UserOnline(PresenceNotice { user_id: PEER }), now);
        assert!(r.is_online(PEER));
        r.apply(&ServerEvent::UserOffline(PresenceNotice { user_id: PEER }), now);
        assert!(!r.is_online(PEER));

        r.apply(
            &ServerEvent::UserTyping(TypingNotice {
                conversation_id: CONV,
                user_id: PEER,
                user_name: "Bea".into(),
            }),
            now,
        );
        assert_eq!(r.typing().typing_in(CONV, now), ["Bea"]);
        let stop = ServerEvent::UserStopTyping(StopTypingNotice {
            conversation_id: CONV,
            user_id: PEER,
        });
        assert_eq!(r.apply(&stop, now + std::time::Duration::from_secs(1)), Outcome::Updated);
        assert!(r.typing().typing_in(CONV, now).is_empty());
    }

    #[test]
    fn history_marks_messages_seen() {
        let mut r = reconciler();
        let m = message(3, CONV, PEER, None);
        r.apply(&ServerEvent::ChatHistory(vec![m.clone()]), Instant::now());
        assert_eq!(r.apply(&personal(&m), Instant::now()), Outcome::Duplicate);
        assert_eq!(r.unread(CONV), 0);
    }

    #[test]
    fn message_for_unknown_conversation_creates_entry() {
        let mut r = reconciler();
        let conv = ConversationId::new(99);
        let mut m = message(4, conv, UserId::new(7), None);
        m.sender_name = "Gus".into();
        r.apply(&personal(&m), Instant::now());
        let entry = r.conversations().get(conv).unwrap();
        assert_eq!(entry.peer.name, "Gus");
        assert_eq!(entry.unread, 1);
    }

    #[test]
    fn reconnect_discards_cached_state() {
        let mut r = reconciler();
        let now = Instant::now();
        r.apply(&ServerEvent::UserOnline(PresenceNotice { user_id: PEER }), now);
        r.apply(&personal(&message(1, CONV, PEER, None)), now);
        r.begin_read(OTHER);

        r.reconnect(vec![summary(CONV, 2, 5, 30)]);
        assert_eq!(r.unread(CONV), 5);
        assert_eq!(r.pending_read(OTHER), None);
        assert!(!r.is_online(PEER));
        assert_eq!(r.conversations().len(), 1);

        // The same message id may be legitimately redelivered via history.
        assert_eq!(r.apply(&personal(&message(1, CONV, PEER, None)), now), Outcome::Updated);
    }

    #[test]
    fn friend_requests_are_collected() {
        let mut r = reconciler();
        r.apply(
            &ServerEvent::NewFriendRequest(FriendRequestNotice {
                sender_id: UserId::new(3),
                name: "Cy".into(),
                avatar_ref: None,
                timestamp: at(0),
            }),
            Instant::now(),
        );
        assert_eq!(r.friend_requests().len(), 1);
        assert_eq!(r.take_friend_requests().len(), 1);
        assert!(r.friend_requests().is_empty());
    }

    #[test]
    fn seen_ids_forget_oldest_past_window() {
        let mut seen = SeenIds::new(2);
        assert!(seen.insert(MessageId::new(1)));
        assert!(seen.insert(MessageId::new(2)));
        assert!(!seen.insert(MessageId::new(2)));
        assert!(seen.insert(MessageId::new(3)));
        assert_eq!(seen.len(), 2);
        assert!(seen.insert(MessageId::new(1)), "evicted id is accepted again");
        assert!(!seen.insert(MessageId::new(3)));
    }

    #[test]
    fn dedup_memory_stays_bounded() {
        let mut r = reconciler();
        let now = Instant::now();
        for id in 1..=(SEEN_WINDOW as i64 + 50) {
            r.apply(&personal(&message(id, CONV, PEER, None)), now);
        }
        assert_eq!(r.seen.len(), SEEN_WINDOW);
        assert_eq!(r.unread(CONV), SEEN_WINDOW as u32 + 50);
        let latest = message(SEEN_WINDOW as i64 + 50, CONV, PEER, None);
        assert_eq!(r.apply(&room(&latest), now), Outcome::Duplicate);
    }
}
