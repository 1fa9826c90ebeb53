//! IdentityCrypto - the local identity and pairwise encryption service
//!
//! Owns the device key pair for one scope (user id) and the shared-secret
//! cache derived from it.
//!
//! ## Example
//!
//! ```rust,ignore
//! let identity = IdentityCrypto::new(store, "alice");
//!
//! let pair = identity.get_or_create_key_pair().await?;
//! let payload = identity.encrypt("hello", &bob_public).await?;
//! let plaintext = identity.decrypt(&incoming).await?;
//! ```
//!
//! The key pair sits behind a [`tokio::sync::RwLock`]. Encrypt and decrypt
//! hold the read lock for the whole operation while rotation and wipe hold
//! the write lock, so no operation ever observes a half-replaced pair.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::crypto::cache::{SharedSecretCache, DEFAULT_CAPACITY};
use crate::crypto::errors::{CryptoError, CryptoResult, StoreError};
use crate::crypto::keys::{Fingerprint, KeyPair, PublicKey, SharedKey};
use crate::crypto::pairwise::{self, EncryptedPayload, SealedMessage};
use crate::crypto::store::{decode_key_pair, encode_key_pair, identity_key, KeyStore};

/// Default bound on a single key store operation
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IdentityCrypto {
    store: Arc<dyn KeyStore>,
    scope: String,
    key_pair: RwLock<Option<Arc<KeyPair>>>,
    cache: Mutex<SharedSecretCache>,
    store_timeout: Duration,
}

impl IdentityCrypto {
    pub fn new(store: Arc<dyn KeyStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
            key_pair: RwLock::new(None),
            cache: Mutex::new(SharedSecretCache::new(DEFAULT_CAPACITY)),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Mutex::new(SharedSecretCache::new(capacity));
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Return the persisted key pair, generating and persisting one if absent
    pub async fn get_or_create_key_pair(&self) -> CryptoResult<Arc<KeyPair>> {
        if let Some(pair) = self.key_pair.read().await.as_ref() {
            return Ok(pair.clone());
        }

        let mut slot = self.key_pair.write().await;
        if let Some(pair) = slot.as_ref() {
            return Ok(pair.clone());
        }

        let pair = Arc::new(self.load_or_generate().await?);
        *slot = Some(pair.clone());
        Ok(pair)
    }

    /// Replace the key pair with a fresh one
    ///
    /// Payloads encrypted to the old public key become undecryptable on
    /// this device, and every cached shared key is dropped.
    pub async fn rotate_key_pair(&self) -> CryptoResult<Arc<KeyPair>> {
        let mut slot = self.key_pair.write().await;
        let key = identity_key(&self.scope);

        self.bounded(self.store.delete(&key)).await?;
        *slot = None;
        self.cache.lock().clear();

        let pair = KeyPair::generate()?;
        self.bounded(self.store.set(&key, &encode_key_pair(&pair)))
            .await?;

        let pair = Arc::new(pair);
        *slot = Some(pair.clone());
        tracing::info!(
            scope = %self.scope,
            fingerprint = %pair.fingerprint(),
            "Rotated identity key pair"
        );
        Ok(pair)
    }

    /// Destroy the local identity without creating a new one
    pub async fn wipe(&self) -> CryptoResult<()> {
        let mut slot = self.key_pair.write().await;
        self.bounded(self.store.delete(&identity_key(&self.scope)))
            .await?;
        *slot = None;
        self.cache.lock().clear();
        tracing::warn!(scope = %self.scope, "Identity key pair wiped");
        Ok(())
    }

    pub async fn public_key(&self) -> CryptoResult<PublicKey> {
        Ok(self.get_or_create_key_pair().await?.public)
    }

    pub async fn fingerprint(&self) -> CryptoResult<Fingerprint> {
        Ok(self.get_or_create_key_pair().await?.fingerprint())
    }

    /// Encrypt a message for `recipient` with the local secret key
    pub async fn encrypt(
        &self,
        plaintext: &str,
        recipient: &PublicKey,
    ) -> CryptoResult<EncryptedPayload> {
        self.with_key_pair(|pair| pairwise::encrypt(plaintext, recipient, pair.secret()))
            .await
    }

    /// Decrypt a payload addressed to the local public key
    pub async fn decrypt(&self, payload: &EncryptedPayload) -> CryptoResult<String> {
        self.with_key_pair(|pair| pairwise::decrypt(payload, pair.secret()))
            .await
    }

    /// Shared key with `peer`, derived once and then served from the cache
    pub async fn shared_key(&self, peer: &PublicKey) -> CryptoResult<SharedKey> {
        self.with_key_pair(|pair| self.cached_shared_key(pair, peer))
            .await
    }

    /// Encrypt for an ongoing conversation using the cached shared key
    pub async fn encrypt_for_peer(
        &self,
        plaintext: &str,
        peer: &PublicKey,
    ) -> CryptoResult<SealedMessage> {
        self.with_key_pair(|pair| {
            let shared = self.cached_shared_key(pair, peer)?;
            pairwise::encrypt_with_shared(plaintext, &shared)
        })
        .await
    }

    pub async fn decrypt_from_peer(
        &self,
        sealed: &SealedMessage,
        peer: &PublicKey,
    ) -> CryptoResult<String> {
        self.with_key_pair(|pair| {
            let shared = self.cached_shared_key(pair, peer)?;
            pairwise::decrypt_with_shared(sealed, &shared)
        })
        .await
    }

    /// Number of peers with a cached shared key
    pub fn cached_peer_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Run `op` against the current key pair while holding the read lock
    async fn with_key_pair<T>(
        &self,
        op: impl FnOnce(&KeyPair) -> CryptoResult<T>,
    ) -> CryptoResult<T> {
        {
            let guard = self.key_pair.read().await;
            if let Some(pair) = guard.as_ref() {
                return op(pair);
            }
        }

        self.get_or_create_key_pair().await?;

        let guard = self.key_pair.read().await;
        match guard.as_ref() {
            Some(pair) => op(pair),
            // A wipe landed between creation and this read
            None => Err(CryptoError::KeyGenerationFailed(
                "identity key pair is unavailable".to_string(),
            )),
        }
    }

    fn cached_shared_key(&self, pair: &KeyPair, peer: &PublicKey) -> CryptoResult<SharedKey> {
        if let Some(shared) = self.cache.lock().get(peer) {
            return Ok(shared);
        }

        let shared = pairwise::derive_shared_key(peer, pair.secret())?;
        self.cache.lock().insert(*peer, shared.clone());
        tracing::debug!(peer = %peer.short_id(), "Derived shared key");
        Ok(shared)
    }

    async fn load_or_generate(&self) -> CryptoResult<KeyPair> {
        let key = identity_key(&self.scope);

        if let Some(blob) = self.bounded(self.store.get(&key)).await? {
            let blob = Zeroizing::new(blob);
            let pair = decode_key_pair(&blob)?;
            tracing::info!(scope = %self.scope, "Loaded existing identity key pair");
            return Ok(pair);
        }

        tracing::info!(scope = %self.scope, "Creating new identity key pair");
        let pair = KeyPair::generate()?;
        self.bounded(self.store.set(&key, &encode_key_pair(&pair)))
            .await?;
        Ok(pair)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> CryptoResult<T> {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(result) => result.map_err(CryptoError::from),
            Err(_) => {
                tracing::warn!(scope = %self.scope, "Key store operation timed out");
                Err(CryptoError::Timeout)
            }
        }
    }
}
