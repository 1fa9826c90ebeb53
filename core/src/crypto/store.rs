//! Local key storage
//!
//! The crypto layer only sees an opaque, scoped key-value store of byte
//! blobs. [`MemoryKeyStore`] lives here; the SQLite-backed store is in
//! [`crate::db`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::encoding;
use crate::crypto::errors::{CryptoError, CryptoResult, StoreError};
use crate::crypto::keys::KeyPair;

/// Opaque key-value persistence for key material
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Storage key of the identity key pair blob for `scope`
pub fn identity_key(scope: &str) -> String {
    format!("{}/identity_keypair", scope)
}

/// In-process store, for tests and throwaway identities
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Local-only persisted form of a key pair
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct StoredKeyPair {
    public_key: String,
    secret_key: String,
}

pub(crate) fn encode_key_pair(pair: &KeyPair) -> Zeroizing<Vec<u8>> {
    let stored = StoredKeyPair {
        public_key: pair.public.to_base64(),
        secret_key: encoding::encode(&pair.secret().to_bytes()[..]),
    };
    // Serializing two strings into a Vec cannot fail
    Zeroizing::new(serde_json::to_vec(&stored).unwrap_or_default())
}

pub(crate) fn decode_key_pair(blob: &[u8]) -> CryptoResult<KeyPair> {
    let stored: StoredKeyPair = serde_json::from_slice(blob)
        .map_err(|e| StoreError::Corrupt(format!("identity key pair: {}", e)))?;
    let public = encoding::decode(&stored.public_key)
        .map_err(|e| StoreError::Corrupt(format!("identity public key: {}", e)))?;
    let secret = Zeroizing::new(
        encoding::decode(&stored.secret_key)
            .map_err(|e| StoreError::Corrupt(format!("identity secret key: {}", e)))?,
    );
    KeyPair::from_parts(&public, &secret).map_err(|e| match e {
        CryptoError::InvalidKey(reason) => CryptoError::Store(StoreError::Corrupt(reason)),
        other => other,
    })
}
