//! Group conversation encryption
//!
//! A conversation shares one symmetric [`GroupKey`]. The initiator wraps
//! it once per participant with pairwise encryption and hands the whole
//! map to the [`KeyDirectory`]; every participant later fetches and
//! unwraps its own copy.
//!
//! Key lifecycle per conversation: `NoKey -> Distributed -> (Rotated ->
//! Distributed)*`. Rotation generates a new key and redistributes it to
//! the current participant set. The old key is never redistributed.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::directory::{DirectoryError, KeyDirectory, WrappedGroupKey, WrappedKeyMap};
use crate::crypto::encoding;
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::identity::IdentityCrypto;
use crate::crypto::keys::{random_nonce, KEY_LEN, NONCE_LEN};
use crate::crypto::pairwise::{self, open_bytes, seal};
use crate::models::MessageBody;

/// Symmetric key shared by all participants of a conversation
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct GroupKey([u8; KEY_LEN]);

impl GroupKey {
    /// Fresh random key, independent of any identity key
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng
            .try_fill_bytes(&mut *bytes)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        Ok(Self(*bytes))
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(encoding::encode(&self.0))
    }

    fn from_base64(text: &str) -> CryptoResult<Self> {
        let raw = Zeroizing::new(
            encoding::decode(text)
                .map_err(|_| CryptoError::MalformedPayload("group key is not base64".to_string()))?,
        );
        let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
            CryptoError::MalformedPayload(format!("group key must be {} bytes", KEY_LEN))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupKey([redacted])")
    }
}

/// Group message wire form: `{"ct": base64, "n": base64}`
#[derive(Serialize, Deserialize)]
struct GroupToken {
    #[serde(with = "encoding::bytes")]
    ct: Vec<u8>,
    #[serde(with = "encoding::nonce")]
    n: [u8; NONCE_LEN],
}

/// Encrypt a message with the group key into a transportable token
pub fn encrypt_group_message(plaintext: &str, key: &GroupKey) -> CryptoResult<String> {
    let nonce = random_nonce()?;
    let ct = seal(key.as_bytes(), &nonce, plaintext.as_bytes())?;
    serde_json::to_string(&GroupToken { ct, n: nonce })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt a group token
///
/// A token sealed under a different (for example pre-rotation) key fails
/// with [`CryptoError::DecryptionFailed`].
pub fn decrypt_group_message(token: &str, key: &GroupKey) -> CryptoResult<String> {
    let parsed: GroupToken = serde_json::from_str(token)
        .map_err(|e| CryptoError::MalformedPayload(format!("group token: {}", e)))?;
    open_bytes(key.as_bytes(), &parsed.n, &parsed.ct)
}

/// Outcome of a best-effort key distribution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Participants who received a wrapped key
    pub delivered: BTreeSet<String>,
    /// Participants skipped because their key could not be resolved or used
    pub failed: BTreeSet<String>,
}

impl DistributionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Errors from group key operations
#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

pub struct GroupCrypto {
    identity: Arc<IdentityCrypto>,
    directory: Arc<dyn KeyDirectory>,
}

impl GroupCrypto {
    pub fn new(identity: Arc<IdentityCrypto>, directory: Arc<dyn KeyDirectory>) -> Self {
        Self {
            identity,
            directory,
        }
    }

    pub fn generate_group_key() -> CryptoResult<GroupKey> {
        GroupKey::generate()
    }

    /// Wrap `group_key` for every participant and submit the map in one call
    ///
    /// Best effort: a participant whose public key cannot be resolved (or
    /// is unusable) is skipped and reported in [`DistributionReport::failed`]
    /// rather than aborting the conversation. Skipped participants are not
    /// retried; they need a later distribution round.
    pub async fn distribute_group_key(
        &self,
        conversation_id: &str,
        participant_ids: &[String],
        group_key: &GroupKey,
    ) -> Result<DistributionReport, GroupError> {
        let my_pair = self.identity.get_or_create_key_pair().await?;
        let secret = group_key.to_base64();

        let participants: BTreeSet<&str> = participant_ids.iter().map(String::as_str).collect();
        let lookups = participants.iter().map(|&participant| async move {
            (participant, self.directory.public_key(participant).await)
        });
        let resolved = join_all(lookups).await;

        let mut keys = WrappedKeyMap::new();
        let mut report = DistributionReport::default();

        for (participant, lookup) in resolved {
            let wrapped = lookup
                .map_err(GroupError::from)
                .and_then(|public| {
                    pairwise::encrypt(&secret, &public, my_pair.secret()).map_err(GroupError::from)
                });

            match wrapped {
                Ok(payload) => {
                    keys.insert(participant.to_string(), WrappedGroupKey(payload));
                    report.delivered.insert(participant.to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        conversation = conversation_id,
                        participant,
                        error = %e,
                        "Couldn't wrap group key for participant, skipping"
                    );
                    report.failed.insert(participant.to_string());
                }
            }
        }

        self.directory
            .distribute_group_key(conversation_id, &keys)
            .await?;

        tracing::info!(
            conversation = conversation_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Distributed group key"
        );
        Ok(report)
    }

    /// Generate a new group key and redistribute it (full replace)
    pub async fn rotate_group_key(
        &self,
        conversation_id: &str,
        participant_ids: &[String],
    ) -> Result<(GroupKey, DistributionReport), GroupError> {
        let key = GroupKey::generate()?;
        let report = self
            .distribute_group_key(conversation_id, participant_ids, &key)
            .await?;
        tracing::info!(conversation = conversation_id, "Rotated group key");
        Ok((key, report))
    }

    /// Fetch and unwrap this identity's copy of the conversation key
    ///
    /// `Ok(None)` means nothing has been distributed to this identity yet.
    pub async fn get_my_group_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<GroupKey>, GroupError> {
        let Some(wrapped) = self.directory.my_group_key(conversation_id).await? else {
            tracing::debug!(conversation = conversation_id, "No group key distributed yet");
            return Ok(None);
        };

        let secret = Zeroizing::new(self.identity.decrypt(&wrapped.0).await?);
        Ok(Some(GroupKey::from_base64(&secret)?))
    }

    pub fn encrypt_group_message(&self, plaintext: &str, key: &GroupKey) -> CryptoResult<String> {
        encrypt_group_message(plaintext, key)
    }

    pub fn decrypt_group_message(&self, token: &str, key: &GroupKey) -> CryptoResult<String> {
        decrypt_group_message(token, key)
    }

    /// Decrypt a group message into the state a conversation view renders
    pub async fn open_group_message(&self, conversation_id: &str, token: &str) -> MessageBody {
        match self.get_my_group_key(conversation_id).await {
            Ok(Some(key)) => MessageBody::from_decryption(decrypt_group_message(token, &key)),
            Ok(None) => MessageBody::KeyPending,
            Err(GroupError::Directory(e)) => {
                tracing::warn!(conversation = conversation_id, error = %e, "Group key lookup failed");
                MessageBody::KeyPending
            }
            Err(GroupError::Crypto(e)) => {
                tracing::warn!(conversation = conversation_id, error = %e, "Group key unusable");
                MessageBody::Undecryptable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::directory::InMemoryKeyDirectory;
    use crate::crypto::store::MemoryKeyStore;
    use proptest::prelude::*;

    struct Member {
        identity: Arc<IdentityCrypto>,
        groups: GroupCrypto,
    }

    async fn member(
        store: &Arc<MemoryKeyStore>,
        directory: &InMemoryKeyDirectory,
        user_id: &str,
        publish: bool,
    ) -> Member {
        let identity = Arc::new(IdentityCrypto::new(store.clone(), user_id));
        let view = directory.as_user(user_id);
        if publish {
            let public = identity.public_key().await.unwrap();
            view.publish_public_key(&public).await.unwrap();
        }
        Member {
            groups: GroupCrypto::new(identity.clone(), Arc::new(view)),
            identity,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_generated_keys_are_random() {
        let first = GroupKey::generate().unwrap();
        let second = GroupKey::generate().unwrap();
        assert_ne!(first, second);
        assert_ne!(first.as_bytes(), &[0u8; KEY_LEN]);
    }

    #[test]
    fn test_group_message_round_trip() {
        let key = GroupKey::generate().unwrap();
        let token = encrypt_group_message("hello group", &key).unwrap();
        assert_eq!(decrypt_group_message(&token, &key).unwrap(), "hello group");
    }

    #[test]
    fn test_group_token_wire_form() {
        let key = GroupKey::generate().unwrap();
        let token = encrypt_group_message("x", &key).unwrap();
        let value: serde_json::Value = serde_json::from_str(&token).unwrap();
        assert!(value["ct"].is_string());
        assert!(value["n"].is_string());
    }

    #[test]
    fn test_stale_group_key_fails() {
        let old = GroupKey::generate().unwrap();
        let new = GroupKey::generate().unwrap();
        let token = encrypt_group_message("after rotation", &new).unwrap();
        assert!(matches!(
            decrypt_group_message(&token, &old),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_malformed_group_token() {
        let key = GroupKey::generate().unwrap();
        assert!(matches!(
            decrypt_group_message("not json", &key),
            Err(CryptoError::MalformedPayload(_))
        ));
        assert!(matches!(
            decrypt_group_message(r#"{"ct":"AAAA"}"#, &key),
            Err(CryptoError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_group_nonce_uniqueness() {
        let key = GroupKey::generate().unwrap();
        let a = encrypt_group_message("same", &key).unwrap();
        let b = encrypt_group_message("same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_distribution_skips_unresolvable_participant() {
        let store = Arc::new(MemoryKeyStore::new());
        let directory = InMemoryKeyDirectory::new();
        let alice = member(&store, &directory, "alice", true).await;
        let bob = member(&store, &directory, "bob", true).await;
        let _carol = member(&store, &directory, "carol", false).await;

        let key = GroupKey::generate().unwrap();
        let report = alice
            .groups
            .distribute_group_key("conv-1", &ids(&["alice", "bob", "carol"]), &key)
            .await
            .unwrap();

        assert_eq!(report.delivered, set(&["alice", "bob"]));
        assert_eq!(report.failed, set(&["carol"]));
        assert!(!report.is_complete());
        assert_eq!(directory.recipients("conv-1"), ids(&["alice", "bob"]));

        let alice_key = alice.groups.get_my_group_key("conv-1").await.unwrap().unwrap();
        let bob_key = bob.groups.get_my_group_key("conv-1").await.unwrap().unwrap();
        assert_eq!(alice_key, key);
        assert_eq!(bob_key, key);
    }

    #[tokio::test]
    async fn test_my_group_key_absent_before_distribution() {
        let store = Arc::new(MemoryKeyStore::new());
        let directory = InMemoryKeyDirectory::new();
        let bob = member(&store, &directory, "bob", true).await;

        assert!(bob.groups.get_my_group_key("conv-1").await.unwrap().is_none());
        let body = bob.groups.open_group_message("conv-1", "{}").await;
        assert_eq!(body, MessageBody::KeyPending);
    }

    #[tokio::test]
    async fn test_recipient_rotation_breaks_unwrap() {
        let store = Arc::new(MemoryKeyStore::new());
        let directory = InMemoryKeyDirectory::new();
        let alice = member(&store, &directory, "alice", true).await;
        let bob = member(&store, &directory, "bob", true).await;

        let key = GroupKey::generate().unwrap();
        alice
            .groups
            .distribute_group_key("conv-1", &ids(&["alice", "bob"]), &key)
            .await
            .unwrap();
        let token = encrypt_group_message("hi", &key).unwrap();

        bob.identity.rotate_key_pair().await.unwrap();

        let err = bob.groups.get_my_group_key("conv-1").await.unwrap_err();
        assert!(matches!(err, GroupError::Crypto(CryptoError::DecryptionFailed(_))));
        assert_eq!(
            bob.groups.open_group_message("conv-1", &token).await,
            MessageBody::Undecryptable
        );
    }

    #[tokio::test]
    async fn test_group_key_rotation_replaces_key() {
        let store = Arc::new(MemoryKeyStore::new());
        let directory = InMemoryKeyDirectory::new();
        let alice = member(&store, &directory, "alice", true).await;
        let bob = member(&store, &directory, "bob", true).await;
        let participants = ids(&["alice", "bob"]);

        let first = GroupKey::generate().unwrap();
        alice
            .groups
            .distribute_group_key("conv-1", &participants, &first)
            .await
            .unwrap();

        let (second, report) = alice
            .groups
            .rotate_group_key("conv-1", &participants)
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_ne!(first, second);

        let bob_key = bob.groups.get_my_group_key("conv-1").await.unwrap().unwrap();
        assert_eq!(bob_key, second);

        let token = encrypt_group_message("new epoch", &second).unwrap();
        assert_eq!(
            bob.groups.open_group_message("conv-1", &token).await,
            MessageBody::Text("new epoch".to_string())
        );

        let stale = encrypt_group_message("old epoch", &first).unwrap();
        assert_eq!(
            bob.groups.open_group_message("conv-1", &stale).await,
            MessageBody::Undecryptable
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_group_round_trip(plaintext in ".*") {
            let key = GroupKey::generate().unwrap();
            let token = encrypt_group_message(&plaintext, &key).unwrap();
            prop_assert_eq!(decrypt_group_message(&token, &key).unwrap(), plaintext);
        }
    }
}
