//! Base64 helpers shared by the wire types

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// `#[serde(with = "bytes")]` for `Vec<u8>` fields carried as base64 strings
pub mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "nonce")]` for 24-byte nonces carried as base64 strings
pub mod nonce {
    use super::*;
    use crate::crypto::keys::NONCE_LEN;

    pub fn serialize<S: Serializer>(
        value: &[u8; NONCE_LEN],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; NONCE_LEN], D::Error> {
        let text = String::deserialize(deserializer)?;
        let raw = decode(&text).map_err(D::Error::custom)?;
        raw.as_slice().try_into().map_err(|_| {
            D::Error::custom(format!("nonce must be {} bytes, got {}", NONCE_LEN, raw.len()))
        })
    }
}
