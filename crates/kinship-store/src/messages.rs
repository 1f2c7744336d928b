use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use kinship_core::messages::Message;
use kinship_core::{ConversationId, MessageId, UserId};

use crate::connection::Database;
use crate::error::{Result, StoreError};
use crate::row_helpers::{get_ts, now_ts};

const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.sender_id, m.body, m.created_at, m.is_read, \
                               u.name, u.avatar_ref";

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId::new(row.get(0)?),
        conversation_id: ConversationId::new(row.get(1)?),
        sender_id: UserId::new(row.get(2)?),
        body: row.get(3)?,
        created_at: get_ts(row, 4)?,
        is_read: row.get(5)?,
        sender_name: row.get(6)?,
        sender_avatar: row.get(7)?,
        client_message_id: None,
    })
}

fn ensure_conversation(conn: &Connection, id: ConversationId) -> Result<()> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM conversations WHERE id = ?1", [id.get()], |r| r.get(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("conversation {id}"))),
    }
}

#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist an unread message with a server-assigned timestamp and return
    /// it joined with the sender's display metadata.
    #[instrument(skip(self, body), fields(conversation_id = %conversation, sender_id = %sender))]
    pub fn insert(&self, conversation: ConversationId, sender: UserId, body: &str) -> Result<Message> {
        let (_, now) = now_ts();
        self.db.with_conn(|conn| {
            ensure_conversation(conn, conversation)?;
            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, body, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                rusqlite::params![conversation.get(), sender.get(), body, now],
            )?;
            let id = conn.last_insert_rowid();
            let message = conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m JOIN users u ON u.id = m.sender_id
                      WHERE m.id = ?1"
                ),
                [id],
                map_message,
            )?;
            debug!(message_id = id, "message stored");
            Ok(message)
        })
    }

    /// Mark every unread message in the conversation not sent by `viewer` as
    /// read. Returns the number of rows changed; repeating it changes none.
    #[instrument(skip(self), fields(conversation_id = %conversation, viewer = %viewer))]
    pub fn mark_read(&self, conversation: ConversationId, viewer: UserId) -> Result<usize> {
        self.db.with_conn(|conn| {
            ensure_conversation(conn, conversation)?;
            Ok(conn.execute(
                "UPDATE messages SET is_read = 1
                  WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                [conversation.get(), viewer.get()],
            )?)
        })
    }

    /// The most recent `limit` messages, oldest first.
    #[instrument(skip(self), fields(conversation_id = %conversation))]
    pub fn history(&self, conversation: ConversationId, limit: usize) -> Result<Vec<Message>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            ensure_conversation(conn, conversation)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM (
                   SELECT {MESSAGE_COLUMNS} FROM messages m JOIN users u ON u.id = m.sender_id
                    WHERE m.conversation_id = ?1
                    ORDER BY m.id DESC
                    LIMIT ?2
                 ) ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map([conversation.get(), limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_count(&self, conversation: ConversationId, viewer: UserId) -> Result<u32> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages
                  WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                [conversation.get(), viewer.get()],
                |row| row.get(0),
            )?)
        })
    }
}
