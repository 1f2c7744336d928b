//! # kinship-server
//!
//! Real-time presence and chat over WebSocket, plus the REST fallback
//! routes. State lives in a [`ChatHub`]:
//!
//! - [`directory::SessionDirectory`]: user → live connection routing
//! - [`presence::PresenceBroadcaster`]: online/offline announcements
//! - [`rooms::RoomRegistry`]: connections grouped by open conversation
//! - [`pipeline::MessagePipeline`]: validate, persist, dual delivery
//! - [`receipts::ReceiptCoordinator`]: typing relay and read receipts
//! - [`notify::NotificationRelay`]: personal-channel pushes

pub mod api;
pub mod auth;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod notify;
pub mod pipeline;
pub mod presence;
pub mod receipts;
pub mod rooms;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod websocket;

pub use auth::{IdentityVerifier, JwtVerifier};
pub use config::{load_settings, ConfigError, Settings};
pub use hub::{ChatHub, HealthSnapshot, HubConfig};
pub use server::{build_router, AppState, ChatServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
