//! Error types for the GhostRecon core

use thiserror::Error;

use crate::crypto::{CryptoError, DirectoryError, GroupError, StoreError};
use crate::realtime::ChannelError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Key store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Realtime error: {0}")]
    Channel(#[from] ChannelError),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<GroupError> for AppError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::Crypto(e) => AppError::Crypto(e),
            GroupError::Directory(e) => AppError::Directory(e),
        }
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

// Serialized as a plain message for the UI layer
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
