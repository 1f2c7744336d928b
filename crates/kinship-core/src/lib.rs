//! Shared vocabulary for the kinship chat core: identifiers, the wire
//! protocol spoken between server and client, message value types, and the
//! error taxonomy every component reports through.

pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;

pub use errors::{ChatError, ErrorKind};
pub use events::{ClientEvent, ServerEvent};
pub use ids::{ConnectionId, ConversationId, MessageId, UserId};
