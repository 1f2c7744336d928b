use kinship_core::ChatError;
use thiserror::Error;

/// Errors raised by the chat store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("migration error: {message}")]
    Migration { message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// A row violated an expectation the schema cannot express.
    #[error("invalid data: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ChatError::validation(format!("{what} does not exist")),
            other => ChatError::persistence(other.to_string()),
        }
    }
}
