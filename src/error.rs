//! Error taxonomy for the messaging core.

use thiserror::Error;

/// Errors raised by the SQLite layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

/// Errors surfaced to callers of core operations.
///
/// Each variant carries a stable [`kind`](ChatError::kind) so clients can
/// branch on it without parsing the human-readable message.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("missing, invalid or expired credentials")]
    Unauthorized,
    #[error("a message needs text, an image or audio")]
    InvalidContent,
    #[error("invalid request body: {0}")]
    MalformedBody(String),
    #[error("message store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("message not found")]
    NotFound,
    #[error("only the sender may delete a message")]
    Forbidden,
    #[error("asset upload failed: {0}")]
    UploadFailed(String),
    #[error("no such user")]
    UnknownPeer,
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Unauthorized => "unauthorized",
            ChatError::InvalidContent | ChatError::MalformedBody(_) => "invalid_content",
            ChatError::StoreUnavailable(_) => "store_unavailable",
            ChatError::NotFound => "not_found",
            ChatError::Forbidden => "forbidden",
            ChatError::UploadFailed(_) => "upload_failed",
            ChatError::UnknownPeer => "unknown_peer",
        }
    }
}

impl From<StorageError> for ChatError {
    fn from(e: StorageError) -> Self {
        ChatError::StoreUnavailable(e.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
