//! SQLite connection pool.
//!
//! Every pooled connection gets WAL mode, foreign keys and a busy timeout
//! through [`PragmaCustomizer`]. An in-memory database only exists inside a
//! single connection, so the in-memory pool is capped at one connection.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::migrations;

pub type ConnectionPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

pub const MEMORY_PATH: &str = ":memory:";

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
    /// How long `get()` waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5_000,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
    }
}

/// Cloneable handle over the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open (or create) the database at `path` and bring its schema up to
    /// date. `":memory:"` opens a private in-memory database.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let db = if path == MEMORY_PATH {
            Self::build(SqliteConnectionManager::memory(), 1, config)?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Invalid(format!("cannot create {}: {e}", parent.display()))
                    })?;
                }
            }
            Self::build(SqliteConnectionManager::file(path), config.pool_size, config)?
        };

        let applied = db.with_conn(migrations::run_migrations)?;
        info!(path, pool_size = db.pool.max_size(), applied, "chat store opened");
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(MEMORY_PATH, &ConnectionConfig::default())
    }

    fn build(manager: SqliteConnectionManager, size: u32, config: &ConnectionConfig) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(size.max(1))
            .connection_timeout(config.acquire_timeout)
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)?;
        Ok(Self { pool })
    }

    /// Run `f` with a pooled connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.pool.get()?;
        f(&*conn)
    }

    pub fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }
}
