use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::instrument;

use kinship_core::messages::Identity;
use kinship_core::UserId;

use crate::connection::Database;
use crate::error::{Result, StoreError};
use crate::row_helpers::{get_ts_opt, now_ts};

/// Identity cache and last-active bookkeeping.
#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or refresh a verified identity and mark it active now.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub fn upsert(&self, identity: &Identity) -> Result<()> {
        let (_, now) = now_ts();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, avatar_ref, created_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   avatar_ref = excluded.avatar_ref,
                   last_active_at = excluded.last_active_at",
                rusqlite::params![identity.user_id.get(), identity.name, identity.avatar_ref, now],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(user_id = %user))]
    pub fn touch_last_active(&self, user: UserId) -> Result<()> {
        let (_, now) = now_ts();
        let updated = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET last_active_at = ?2 WHERE id = ?1",
                rusqlite::params![user.get(), now],
            )?)
        })?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("user {user}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    pub fn profile(&self, user: UserId) -> Result<Identity> {
        self.db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, name, avatar_ref FROM users WHERE id = ?1",
                        [user.get()],
                        |row| {
                            Ok(Identity {
                                user_id: UserId::new(row.get(0)?),
                                name: row.get(1)?,
                                avatar_ref: row.get(2)?,
                            })
                        },
                    )
                    .optional()?)
            })?
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))
    }

    pub fn last_active(&self, user: UserId) -> Result<Option<DateTime<Utc>>> {
        self.db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT last_active_at FROM users WHERE id = ?1",
                        [user.get()],
                        |row| get_ts_opt(row, 0),
                    )
                    .optional()?)
            })?
            .ok_or_else(|| StoreError::NotFound(format!("user {user}")))
    }

    pub fn exists(&self, user: UserId) -> Result<bool> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE id = ?1", [user.get()], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }
}
