//! Persistence for the chat core: pooled SQLite, versioned migrations, and
//! the [`ChatStore`] interface the server calls from blocking tasks.

pub mod connection;
pub mod conversations;
pub mod error;
pub mod friends;
pub mod messages;
pub mod migrations;
mod row_helpers;
pub mod store;
pub mod users;

pub use connection::{ConnectionConfig, Database};
pub use error::StoreError;
pub use friends::{FriendPresence, FriendStatus};
pub use store::{ChatStore, SqliteChatStore};
