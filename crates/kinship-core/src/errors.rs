use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Failure taxonomy shared by every component of the chat core.
///
/// Handlers isolate their own failures: an error is reported to the
/// originating connection (or HTTP caller) and never tears down the
/// dispatch loop.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Handshake rejected. The connection is never established.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Request rejected before any persistence or broadcast happened.
    #[error("invalid request: {0}")]
    Validation(String),
    /// A storage call failed. Nothing was broadcast.
    #[error("persistence failed: {0}")]
    Persistence(String),
    /// Recipient has no live connection. Recoverable via history reload.
    #[error("user {user_id} is not connected")]
    DeliveryMiss { user_id: UserId },
}

/// Wire-level classification of a [`ChatError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Validation,
    Persistence,
    DeliveryMiss,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::DeliveryMiss => "delivery_miss",
        }
    }
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::DeliveryMiss { .. } => ErrorKind::DeliveryMiss,
        }
    }

    /// Silent failures are logged at debug level and never reported to the
    /// caller.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::DeliveryMiss { .. })
    }
}
