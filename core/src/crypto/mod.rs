//! End-to-end encryption core
//!
//! Identity keys are X25519; every payload is sealed with XChaCha20-Poly1305
//! under a fresh random 24-byte nonce.
//!
//! ## Components
//!
//! - **keys**: Key material (public, secret, shared keys and fingerprints)
//! - **pairwise**: One-to-one authenticated encryption between key pairs
//! - **identity**: IdentityCrypto, the local key pair and shared-secret cache
//! - **store**: KeyStore boundary for persisting key material
//! - **directory**: KeyDirectory boundary for published keys
//! - **group**: GroupCrypto, wrapped group keys and group messages
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crate::crypto::{GroupCrypto, IdentityCrypto};
//!
//! let identity = Arc::new(IdentityCrypto::new(store, user_id));
//! let payload = identity.encrypt("hello", &bob_public).await?;
//!
//! let groups = GroupCrypto::new(identity.clone(), directory);
//! let key = GroupCrypto::generate_group_key()?;
//! groups.distribute_group_key(conversation_id, &participants, &key).await?;
//! let token = groups.encrypt_group_message("hello all", &key)?;
//! ```

pub mod cache;
pub mod directory;
pub mod encoding;
pub mod errors;
pub mod group;
pub mod identity;
pub mod keys;
pub mod pairwise;
pub mod store;

// Re-export commonly used types
pub use directory::{
    DirectoryError, InMemoryKeyDirectory, KeyDirectory, WrappedGroupKey, WrappedKeyMap,
};
pub use errors::{CryptoError, CryptoResult, StoreError};
pub use group::{DistributionReport, GroupCrypto, GroupError, GroupKey};
pub use identity::IdentityCrypto;
pub use keys::{Fingerprint, KeyPair, PublicKey, SecretKey, SharedKey};
pub use pairwise::{EncryptedPayload, SealedMessage};
pub use store::{KeyStore, MemoryKeyStore};
