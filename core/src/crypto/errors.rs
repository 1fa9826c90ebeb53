//! Cryptographic error types
//!
//! Error messages carry a short reason only. Plaintext, key bytes and
//! partially decrypted data never end up in an error.

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The entropy source failed while generating key material
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Key material is malformed (wrong length, bad encoding)
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Failed to derive a shared secret
    #[error("Key exchange failed: {0}")]
    KeyExchangeFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authentication check did not verify
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// A payload or token could not be parsed
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Local key store error
    #[error("Key store error: {0}")]
    Store(#[from] StoreError),

    /// A key store operation did not complete in time
    #[error("Key store operation timed out")]
    Timeout,
}

impl CryptoError {
    /// Whether this failure should be shown as an undecryptable message
    /// rather than an error screen.
    pub fn is_undecryptable(&self) -> bool {
        matches!(
            self,
            CryptoError::DecryptionFailed(_) | CryptoError::MalformedPayload(_)
        )
    }
}

impl From<chacha20poly1305::aead::Error> for CryptoError {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        CryptoError::DecryptionFailed("authentication check failed".to_string())
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::MalformedPayload(format!("invalid base64: {}", e))
    }
}

/// Errors raised by a [`KeyStore`](crate::crypto::store::KeyStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Generic backend failure
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A stored blob could not be decoded
    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
