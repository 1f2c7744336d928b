use thiserror::Error;

use kinship_core::ErrorKind;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        kind: Option<ErrorKind>,
        message: String,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("malformed server frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::WebSocket(_) | Self::Closed => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::Protocol(_) | Self::InvalidUrl(_) => false,
        }
    }
}
