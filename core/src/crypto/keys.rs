//! Key types for the identity layer
//!
//! - [`PublicKey`]: X25519 public key, the only part of an identity that
//!   leaves the device
//! - [`SecretKey`]: X25519 static secret, zeroized on drop, never serialized
//! - [`KeyPair`]: the local device identity
//! - [`SharedKey`]: symmetric key derived from a Diffie-Hellman exchange
//! - [`Fingerprint`]: short digest of a public key for out-of-band checks

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::encoding;
use crate::crypto::errors::{CryptoError, CryptoResult};

/// Length of public, secret, shared and group keys
pub const KEY_LEN: usize = 32;

/// Length of an XChaCha20-Poly1305 nonce
pub const NONCE_LEN: usize = 24;

/// Number of characters kept from the encoded digest
const FINGERPRINT_LEN: usize = 32;

/// X25519 public key (safe to share)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Restore from raw bytes, rejecting anything that is not 32 bytes
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Public key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let raw = encoding::decode(text)
            .map_err(|e| CryptoError::InvalidKey(format!("Public key is not base64: {}", e)))?;
        Self::from_slice(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    /// Short hex prefix, used in log fields
    pub fn short_id(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short_id())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        PublicKey::from_base64(&text).map_err(D::Error::custom)
    }
}

impl From<&x25519_dalek::PublicKey> for PublicKey {
    fn from(key: &x25519_dalek::PublicKey) -> Self {
        Self(key.to_bytes())
    }
}

/// X25519 secret key (never leaves device)
///
/// Deliberately implements neither `Clone` nor `Serialize`.
pub struct SecretKey(x25519_dalek::StaticSecret);

impl SecretKey {
    /// Generate a new secret from OS entropy
    pub fn generate() -> CryptoResult<Self> {
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        OsRng
            .try_fill_bytes(&mut *seed)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        Ok(Self(x25519_dalek::StaticSecret::from(*seed)))
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: Zeroizing<[u8; KEY_LEN]> = Zeroizing::new(bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Secret key must be {} bytes", KEY_LEN))
        })?);
        Ok(Self(x25519_dalek::StaticSecret::from(*arr)))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&x25519_dalek::PublicKey::from(&self.0))
    }

    pub(crate) fn diffie_hellman(&self, their_public: &PublicKey) -> x25519_dalek::SharedSecret {
        self.0
            .diffie_hellman(&x25519_dalek::PublicKey::from(*their_public.as_bytes()))
    }

    /// Raw bytes for the local key store only
    pub(crate) fn to_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.0.to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([redacted])")
    }
}

/// The local identity key pair
///
/// Generated once per identity epoch and replaced wholesale on rotation.
#[derive(Debug)]
pub struct KeyPair {
    /// Public key (safe to share)
    pub public: PublicKey,
    /// Secret key (never leaves device)
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> CryptoResult<Self> {
        Ok(Self::from_secret(SecretKey::generate()?))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        Self {
            public: secret.public_key(),
            secret,
        }
    }

    /// Restore from stored parts, checking that they belong together
    pub fn from_parts(public: &[u8], secret: &[u8]) -> CryptoResult<Self> {
        let public = PublicKey::from_slice(public)?;
        let pair = Self::from_secret(SecretKey::from_slice(secret)?);
        if pair.public != public {
            return Err(CryptoError::InvalidKey(
                "Stored public key does not match secret key".to_string(),
            ));
        }
        Ok(pair)
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }
}

/// Symmetric key derived from a Diffie-Hellman exchange
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_LEN]);

impl SharedKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey([redacted])")
    }
}

/// Short deterministic digest of a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-512 of the key, base64 encoded, truncated for display
    pub fn of(public: &PublicKey) -> Self {
        let digest = Sha512::digest(public.as_bytes());
        let mut encoded = encoding::encode(&digest);
        encoded.truncate(FINGERPRINT_LEN);
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fresh random nonce for a single encryption
pub(crate) fn random_nonce() -> CryptoResult<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::EncryptionFailed(format!("nonce generation: {}", e)))?;
    Ok(nonce)
}
