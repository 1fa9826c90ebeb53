//! Key directory boundary
//!
//! The backend stores every user's public key and, per conversation, one
//! wrapped group key per participant. [`KeyDirectory`] is the seam the
//! crypto layer calls through; the HTTP implementation lives in
//! [`crate::api`], [`InMemoryKeyDirectory`] serves tests and offline use.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::crypto::errors::CryptoResult;
use crate::crypto::keys::PublicKey;
use crate::crypto::pairwise::EncryptedPayload;

/// Errors returned by a key directory
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("No public key published for {0}")]
    NotFound(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Directory request timed out")]
    Timeout,

    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),

    #[error("Could not encode directory request: {0}")]
    Encoding(String),
}

/// A group key encrypted to one participant's public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedGroupKey(pub EncryptedPayload);

impl WrappedGroupKey {
    /// Wire form: the payload JSON, carried as a string value
    pub fn to_wire(&self) -> CryptoResult<String> {
        self.0.to_json()
    }

    pub fn from_wire(text: &str) -> CryptoResult<Self> {
        EncryptedPayload::from_json(text).map(Self)
    }
}

/// Participant id to wrapped group key, for one conversation
pub type WrappedKeyMap = BTreeMap<String, WrappedGroupKey>;

#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Resolve a user's published public key
    async fn public_key(&self, user_id: &str) -> Result<PublicKey, DirectoryError>;

    /// Publish the caller's public key
    async fn publish_public_key(&self, public_key: &PublicKey) -> Result<(), DirectoryError>;

    /// Submit the complete participant -> wrapped key map for a conversation
    async fn distribute_group_key(
        &self,
        conversation_id: &str,
        keys: &WrappedKeyMap,
    ) -> Result<(), DirectoryError>;

    /// The caller's wrapped key for a conversation, if one was distributed
    async fn my_group_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<WrappedGroupKey>, DirectoryError>;
}

#[derive(Default)]
struct DirectoryData {
    public_keys: HashMap<String, PublicKey>,
    group_keys: HashMap<String, WrappedKeyMap>,
    unreachable: HashSet<String>,
}

/// Directory held in memory and shared between per-user views
///
/// `InMemoryKeyDirectory::new()` has no caller identity; use
/// [`as_user`](Self::as_user) to obtain the view a signed-in user sees.
#[derive(Clone, Default)]
pub struct InMemoryKeyDirectory {
    data: Arc<Mutex<DirectoryData>>,
    caller: Option<String>,
}

impl InMemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view of the same directory authenticated as `user_id`
    pub fn as_user(&self, user_id: &str) -> Self {
        Self {
            data: self.data.clone(),
            caller: Some(user_id.to_string()),
        }
    }

    /// Make every lookup of `user_id` fail as if the backend were down
    pub fn mark_unreachable(&self, user_id: &str) {
        self.data.lock().unreachable.insert(user_id.to_string());
    }

    /// Register a public key on behalf of `user_id`
    pub fn insert_public_key(&self, user_id: &str, public_key: PublicKey) {
        self.data
            .lock()
            .public_keys
            .insert(user_id.to_string(), public_key);
    }

    /// Participants that currently hold a wrapped key for `conversation_id`
    pub fn recipients(&self, conversation_id: &str) -> Vec<String> {
        self.data
            .lock()
            .group_keys
            .get(conversation_id)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn caller(&self) -> Result<&str, DirectoryError> {
        self.caller.as_deref().ok_or(DirectoryError::NotAuthenticated)
    }
}

#[async_trait]
impl KeyDirectory for InMemoryKeyDirectory {
    async fn public_key(&self, user_id: &str) -> Result<PublicKey, DirectoryError> {
        let data = self.data.lock();
        if data.unreachable.contains(user_id) {
            return Err(DirectoryError::Unavailable(format!(
                "lookup of {} failed",
                user_id
            )));
        }
        data.public_keys
            .get(user_id)
            .copied()
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))
    }

    async fn publish_public_key(&self, public_key: &PublicKey) -> Result<(), DirectoryError> {
        let caller = self.caller()?;
        self.insert_public_key(caller, *public_key);
        Ok(())
    }

    async fn distribute_group_key(
        &self,
        conversation_id: &str,
        keys: &WrappedKeyMap,
    ) -> Result<(), DirectoryError> {
        self.caller()?;
        self.data
            .lock()
            .group_keys
            .insert(conversation_id.to_string(), keys.clone());
        Ok(())
    }

    async fn my_group_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<WrappedGroupKey>, DirectoryError> {
        let caller = self.caller()?;
        Ok(self
            .data
            .lock()
            .group_keys
            .get(conversation_id)
            .and_then(|keys| keys.get(caller))
            .cloned())
    }
}
