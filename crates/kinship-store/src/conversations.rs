use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use kinship_core::messages::{ConversationSummary, Participants, PeerProfile};
use kinship_core::{ConversationId, UserId};

use crate::connection::Database;
use crate::error::{Result, StoreError};
use crate::row_helpers::{get_ts, now_ts};

#[derive(Clone)]
pub struct ConversationRepo {
    db: Database,
}

impl ConversationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the conversation for the unordered pair, creating it if needed.
    #[instrument(skip(self), fields(a = %a, b = %b))]
    pub fn open(&self, a: UserId, b: UserId) -> Result<ConversationId> {
        let pair = Participants::canonical(a, b).map_err(|e| StoreError::Invalid(e.to_string()))?;
        let (_, now) = now_ts();
        self.db.with_conn(|conn| {
            for user in [pair.low, pair.high] {
                let known: Option<i64> = conn
                    .query_row("SELECT id FROM users WHERE id = ?1", [user.get()], |r| r.get(0))
                    .optional()?;
                if known.is_none() {
                    return Err(StoreError::NotFound(format!("user {user}")));
                }
            }

            let created = conn.execute(
                "INSERT INTO conversations (user_low, user_high, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(user_low, user_high) DO NOTHING",
                rusqlite::params![pair.low.get(), pair.high.get(), now],
            )?;
            let id: i64 = conn.query_row(
                "SELECT id FROM conversations WHERE user_low = ?1 AND user_high = ?2",
                [pair.low.get(), pair.high.get()],
                |row| row.get(0),
            )?;
            if created > 0 {
                debug!(conversation_id = id, "conversation created");
            }
            Ok(ConversationId::new(id))
        })
    }

    pub fn participants(&self, id: ConversationId) -> Result<Participants> {
        self.db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT user_low, user_high FROM conversations WHERE id = ?1",
                        [id.get()],
                        |row| {
                            Ok(Participants {
                                low: UserId::new(row.get(0)?),
                                high: UserId::new(row.get(1)?),
                            })
                        },
                    )
                    .optional()?)
            })?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))
    }

    /// Record the latest message preview and bump the recency timestamp.
    #[instrument(skip(self, summary), fields(conversation_id = %id))]
    pub fn touch(&self, id: ConversationId, summary: &str) -> Result<()> {
        let (_, now) = now_ts();
        let updated = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE conversations SET last_message = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id.get(), summary, now],
            )?)
        })?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    /// Every conversation `viewer` takes part in, most recent first, with
    /// the count of the peer's messages `viewer` has not read.
    #[instrument(skip(self), fields(viewer = %viewer))]
    pub fn list_for(&self, viewer: UserId) -> Result<Vec<ConversationSummary>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, u.id, u.name, u.avatar_ref, c.last_message, c.updated_at,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id
                            AND m.sender_id != ?1
                            AND m.is_read = 0)
                   FROM conversations c
                   JOIN users u
                     ON u.id = CASE WHEN c.user_low = ?1 THEN c.user_high ELSE c.user_low END
                  WHERE c.user_low = ?1 OR c.user_high = ?1
                  ORDER BY c.updated_at DESC, c.id DESC",
            )?;
            let rows = stmt
                .query_map([viewer.get()], |row| {
                    Ok(ConversationSummary {
                        conversation_id: ConversationId::new(row.get(0)?),
                        peer: PeerProfile {
                            user_id: UserId::new(row.get(1)?),
                            name: row.get(2)?,
                            avatar_ref: row.get(3)?,
                        },
                        last_message: row.get(4)?,
                        updated_at: get_ts(row, 5)?,
                        unread_count: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
