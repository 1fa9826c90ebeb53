//! Pairwise authenticated encryption between two identities
//!
//! Both the one-shot path ([`encrypt`] / [`decrypt`]) and the
//! conversation path ([`encrypt_with_shared`] / [`decrypt_with_shared`])
//! seal with XChaCha20-Poly1305 under a key derived from X25519 and
//! HKDF-SHA256. The one-shot path redoes the key agreement per message;
//! the conversation path reuses a [`SharedKey`] from [`derive_shared_key`].

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::encoding;
use crate::crypto::errors::{CryptoError, CryptoResult};
use crate::crypto::keys::{random_nonce, PublicKey, SecretKey, SharedKey, KEY_LEN, NONCE_LEN};

const SHARED_KEY_INFO: &[u8] = b"GhostRecon Shared Key v1";

/// Self-describing pairwise ciphertext
///
/// Carries the sender's public key so the recipient needs no lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    #[serde(with = "encoding::bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "encoding::nonce")]
    pub nonce: [u8; NONCE_LEN],
    pub sender_public_key: PublicKey,
}

impl EncryptedPayload {
    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
    }

    /// Parse the JSON wire form
    pub fn from_json(text: &str) -> CryptoResult<Self> {
        serde_json::from_str(text).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
    }
}

/// Ciphertext sealed under an already derived [`SharedKey`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    #[serde(with = "encoding::bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "encoding::nonce")]
    pub nonce: [u8; NONCE_LEN],
}

/// Derive the symmetric key shared with a peer
///
/// `derive_shared_key(b.public, a.secret) == derive_shared_key(a.public, b.secret)`.
pub fn derive_shared_key(their_public: &PublicKey, my_secret: &SecretKey) -> CryptoResult<SharedKey> {
    let dh = my_secret.diffie_hellman(their_public);
    if !dh.was_contributory() {
        return Err(CryptoError::InvalidKey(
            "Peer public key is a low-order point".to_string(),
        ));
    }

    let hkdf = Hkdf::<Sha256>::new(None, dh.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hkdf.expand(SHARED_KEY_INFO, &mut okm)
        .map_err(|e| CryptoError::KeyExchangeFailed(e.to_string()))?;
    Ok(SharedKey::from_bytes(okm))
}

/// Encrypt a message for a recipient
pub fn encrypt(
    plaintext: &str,
    recipient_public: &PublicKey,
    sender_secret: &SecretKey,
) -> CryptoResult<EncryptedPayload> {
    let shared = derive_shared_key(recipient_public, sender_secret)?;
    let sealed = encrypt_with_shared(plaintext, &shared)?;

    Ok(EncryptedPayload {
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce,
        sender_public_key: sender_secret.public_key(),
    })
}

/// Decrypt a message addressed to `recipient_secret`
///
/// Fails with [`CryptoError::DecryptionFailed`] for a wrong key, a
/// corrupted ciphertext or a tampered nonce / sender key.
pub fn decrypt(payload: &EncryptedPayload, recipient_secret: &SecretKey) -> CryptoResult<String> {
    let shared = derive_shared_key(&payload.sender_public_key, recipient_secret).map_err(|e| {
        match e {
            CryptoError::InvalidKey(_) => {
                CryptoError::DecryptionFailed("invalid sender public key".to_string())
            }
            other => other,
        }
    })?;
    open(&shared, &payload.nonce, &payload.ciphertext)
}

/// Encrypt with a shared key (faster for ongoing conversations)
pub fn encrypt_with_shared(plaintext: &str, shared: &SharedKey) -> CryptoResult<SealedMessage> {
    let nonce = random_nonce()?;
    let ciphertext = seal(shared.as_bytes(), &nonce, plaintext.as_bytes())?;
    Ok(SealedMessage { ciphertext, nonce })
}

/// Decrypt with a shared key
pub fn decrypt_with_shared(sealed: &SealedMessage, shared: &SharedKey) -> CryptoResult<String> {
    open(shared, &sealed.nonce, &sealed.ciphertext)
}

pub(crate) fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed("XChaCha20-Poly1305 seal failed".to_string()))
}

pub(crate) fn open_bytes(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> CryptoResult<String> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher.decrypt(XNonce::from_slice(nonce), ciphertext)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".to_string()))
}

fn open(shared: &SharedKey, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> CryptoResult<String> {
    open_bytes(shared.as_bytes(), nonce, ciphertext)
}
