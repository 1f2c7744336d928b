use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use kinship_core::messages::PeerProfile;
use kinship_core::UserId;

use crate::connection::Database;
use crate::error::{Result, StoreError};
use crate::row_helpers::{get_ts_opt, now_ts};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

impl FriendStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

/// An accepted friend and their durable last-active timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendPresence {
    #[serde(flatten)]
    pub profile: PeerProfile,
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct FriendRepo {
    db: Database,
}

impl FriendRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Set the status of the friendship between two users, whichever of
    /// them requested it.
    #[instrument(skip(self), fields(requester = %requester, addressee = %addressee, status = status.as_str()))]
    pub fn upsert(&self, requester: UserId, addressee: UserId, status: FriendStatus) -> Result<()> {
        if requester == addressee {
            return Err(StoreError::Invalid("a user cannot befriend themselves".into()));
        }
        let (_, now) = now_ts();
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let updated = tx.execute(
                "UPDATE friends SET status = ?3
                  WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                rusqlite::params![requester.get(), addressee.get(), status.as_str()],
            )?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO friends (user_id, friend_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![requester.get(), addressee.get(), status.as_str(), now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(viewer = %viewer))]
    pub fn accepted(&self, viewer: UserId) -> Result<Vec<FriendPresence>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.avatar_ref, u.last_active_at
                   FROM friends f
                   JOIN users u
                     ON u.id = CASE WHEN f.user_id = ?1 THEN f.friend_id ELSE f.user_id END
                  WHERE (f.user_id = ?1 OR f.friend_id = ?1) AND f.status = 'accepted'
                  ORDER BY u.name ASC",
            )?;
            let rows = stmt
                .query_map([viewer.get()], |row| {
                    Ok(FriendPresence {
                        profile: PeerProfile {
                            user_id: UserId::new(row.get(0)?),
                            name: row.get(1)?,
                            avatar_ref: row.get(2)?,
                        },
                        last_active_at: get_ts_opt(row, 3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
