use kinship_core::messages::{ConversationSummary, Identity, Message, Participants};
use kinship_core::{ConversationId, UserId};

use crate::connection::Database;
use crate::conversations::ConversationRepo;
use crate::error::Result;
use crate::friends::{FriendPresence, FriendRepo, FriendStatus};
use crate::messages::MessageRepo;
use crate::users::UserRepo;

/// The persistence operations the chat core depends on.
///
/// Every call is a bounded, blocking round-trip on a pooled connection.
/// Async callers run them on the blocking thread pool.
pub trait ChatStore: Send + Sync + 'static {
    fn upsert_user(&self, identity: &Identity) -> Result<()>;
    fn touch_last_active(&self, user: UserId) -> Result<()>;
    fn user_profile(&self, user: UserId) -> Result<Identity>;

    fn open_conversation(&self, a: UserId, b: UserId) -> Result<ConversationId>;
    fn participants(&self, conversation: ConversationId) -> Result<Participants>;
    fn list_conversations(&self, viewer: UserId) -> Result<Vec<ConversationSummary>>;
    fn touch_conversation(&self, conversation: ConversationId, last_message: &str) -> Result<()>;

    fn insert_message(&self, conversation: ConversationId, sender: UserId, body: &str) -> Result<Message>;
    fn mark_conversation_read(&self, conversation: ConversationId, viewer: UserId) -> Result<usize>;
    fn load_history(&self, conversation: ConversationId, limit: usize) -> Result<Vec<Message>>;

    fn upsert_friendship(&self, requester: UserId, addressee: UserId, status: FriendStatus) -> Result<()>;
    fn accepted_friends(&self, viewer: UserId) -> Result<Vec<FriendPresence>>;
}

/// [`ChatStore`] backed by the pooled SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteChatStore {
    users: UserRepo,
    conversations: ConversationRepo,
    messages: MessageRepo,
    friends: FriendRepo,
}

impl SqliteChatStore {
    pub fn new(db: Database) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            conversations: ConversationRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            friends: FriendRepo::new(db),
        }
    }

    pub fn unread_count(&self, conversation: ConversationId, viewer: UserId) -> Result<u32> {
        self.messages.unread_count(conversation, viewer)
    }
}

impl ChatStore for SqliteChatStore {
    fn upsert_user(&self, identity: &Identity) -> Result<()> {
        self.users.upsert(identity)
    }

    fn touch_last_active(&self, user: UserId) -> Result<()> {
        self.users.touch_last_active(user)
    }

    fn user_profile(&self, user: UserId) -> Result<Identity> {
        self.users.profile(user)
    }

    fn open_conversation(&self, a: UserId, b: UserId) -> Result<ConversationId> {
        self.conversations.open(a, b)
    }

    fn participants(&self, conversation: ConversationId) -> Result<Participants> {
        self.conversations.participants(conversation)
    }

    fn list_conversations(&self, viewer: UserId) -> Result<Vec<ConversationSummary>> {
        self.conversations.list_for(viewer)
    }

    fn touch_conversation(&self, conversation: ConversationId, last_message: &str) -> Result<()> {
        self.conversations.touch(conversation, last_message)
    }

    fn insert_message(&self, conversation: ConversationId, sender: UserId, body: &str) -> Result<Message> {
        self.messages.insert(conversation, sender, body)
    }

    fn mark_conversation_read(&self, conversation: ConversationId, viewer: UserId) -> Result<usize> {
        self.messages.mark_read(conversation, viewer)
    }

    fn load_history(&self, conversation: ConversationId, limit: usize) -> Result<Vec<Message>> {
        self.messages.history(conversation, limit)
    }

    fn upsert_friendship(&self, requester: UserId, addressee: UserId, status: FriendStatus) -> Result<()> {
        self.friends.upsert(requester, addressee, status)
    }

    fn accepted_friends(&self, viewer: UserId) -> Result<Vec<FriendPresence>> {
        self.friends.accepted(viewer)
    }
}
