use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Stored message could not be decoded: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Storage connection poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Completion provider failed: {0}")]
    Upstream(Box<dyn StdError + Send + Sync>),
    #[error("Message store failed: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ChatError::InvalidArgument(message.into())
    }
}
