//! Client-side state for the kinship chat core.
//!
//! [`Reconciler`] owns the cached conversation list, unread counters,
//! presence and typing badges, and applies server events to them. The
//! [`ChatSocket`] and [`ApiClient`] transports feed it.

pub mod conversations;
pub mod error;
pub mod foreground;
pub mod http;
pub mod pending;
pub mod reconciler;
pub mod transport;
pub mod typing;

pub use conversations::{ConversationEntry, ConversationList};
pub use error::{ClientError, Result};
pub use foreground::ForegroundPanel;
pub use http::ApiClient;
pub use pending::{PendingSend, PendingSends, SendState};
pub use reconciler::{Outcome, ReadMarker, Reconciler};
pub use transport::ChatSocket;
pub use typing::TypingIndicators;
