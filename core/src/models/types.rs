//! Shared data types for the HTTP API, realtime frames and conversation views

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::{CryptoError, CryptoResult, PublicKey};

// ============================================================================
// Key Directory Types
// ============================================================================

/// Response from GET /api/keys/{user_id}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub user_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub public_key: String,
}

/// Body of POST /api/keys/publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishKeyRequest {
    pub public_key: PublicKey,
}

/// Body of POST /api/groups/distribute-key
///
/// Each value is the wrapped key payload JSON carried as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributeKeyRequest {
    pub conversation_id: String,
    pub encrypted_keys: BTreeMap<String, String>,
}

/// Response from GET /api/groups/{conversation_id}/key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupKeyResponse {
    pub encrypted_key: Option<String>,
}

// ============================================================================
// Message Types
// ============================================================================

/// Body of POST /api/messages
///
/// `content` is ciphertext: a serialized payload or group token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreate {
    pub conversation_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_destruct_seconds: Option<u32>,
    pub forward_protected: bool,
}

impl MessageCreate {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            self_destruct_seconds: None,
            forward_protected: true,
        }
    }
}

/// A stored message as the backend returns and broadcasts it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_alias: Option<String>,
    /// Ciphertext, opaque to the transport
    pub content: String,
    #[serde(default = "default_true")]
    pub encrypted: bool,
    #[serde(default)]
    pub self_destruct_seconds: Option<u32>,
    #[serde(default = "default_true")]
    pub forward_protected: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Render Types
// ============================================================================

/// What a conversation view shows for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum MessageBody {
    /// Decrypted plaintext
    Text(String),
    /// Decryption failed; the message can never be shown
    Undecryptable,
    /// No key material is available yet
    KeyPending,
}

impl MessageBody {
    /// Map a decryption outcome to a view state
    ///
    /// Only authentication and format failures are undecryptable; anything
    /// else (store timeout, missing key pair) may succeed later.
    pub fn from_decryption(result: CryptoResult<String>) -> Self {
        match result {
            Ok(text) => Self::Text(text),
            Err(e) if e.is_undecryptable() => Self::Undecryptable,
            Err(CryptoError::InvalidKey(_)) => Self::Undecryptable,
            Err(e) => {
                tracing::debug!(error = %e, "Message pending key material");
                Self::KeyPending
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}
