//! Key directory backed by the HTTP API

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::api::client::ApiClient;
use crate::crypto::{
    CryptoError, DirectoryError, KeyDirectory, PublicKey, WrappedGroupKey, WrappedKeyMap,
};
use crate::error::AppError;
use crate::state::SessionSlot;

pub struct HttpKeyDirectory {
    api: ApiClient,
    session: SessionSlot,
}

impl HttpKeyDirectory {
    pub fn new(api: ApiClient, session: SessionSlot) -> Self {
        Self { api, session }
    }

    fn token(&self) -> Result<String, DirectoryError> {
        self.session
            .current()
            .map(|s| s.token)
            .ok_or(DirectoryError::NotAuthenticated)
    }
}

fn directory_error(err: AppError) -> DirectoryError {
    match err {
        AppError::Http(e) if e.is_timeout() => DirectoryError::Timeout,
        AppError::Http(e) if e.is_decode() => DirectoryError::InvalidResponse(e.to_string()),
        AppError::Http(e) => DirectoryError::Unavailable(e.to_string()),
        AppError::Json(e) => DirectoryError::InvalidResponse(e.to_string()),
        AppError::SessionExpired => DirectoryError::SessionExpired,
        AppError::NotAuthenticated => DirectoryError::NotAuthenticated,
        AppError::Api { status, body } => DirectoryError::Api { status, body },
        other => DirectoryError::Unavailable(other.to_string()),
    }
}

/// A request body that could not be built locally
fn encoding_error(participant: &str, err: CryptoError) -> DirectoryError {
    DirectoryError::Encoding(format!("wrapped key for {}: {}", participant, err))
}

/// Wire form of every wrapped key, ready for the distribute request body
fn wire_keys(keys: &WrappedKeyMap) -> Result<BTreeMap<String, String>, DirectoryError> {
    keys.iter()
        .map(|(participant, wrapped)| {
            let wire = wrapped
                .to_wire()
                .map_err(|e| encoding_error(participant, e))?;
            Ok((participant.clone(), wire))
        })
        .collect()
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn public_key(&self, user_id: &str) -> Result<PublicKey, DirectoryError> {
        let token = self.token()?;
        let response = match self.api.get_public_key(user_id, &token).await {
            Ok(response) => response,
            Err(AppError::Api { status: 404, .. }) => {
                return Err(DirectoryError::NotFound(user_id.to_string()))
            }
            Err(e) => return Err(directory_error(e)),
        };

        PublicKey::from_base64(&response.public_key)
            .map_err(|e| DirectoryError::InvalidResponse(format!("public key of {}: {}", user_id, e)))
    }

    async fn publish_public_key(&self, public_key: &PublicKey) -> Result<(), DirectoryError> {
        let token = self.token()?;
        self.api
            .publish_public_key(public_key, &token)
            .await
            .map_err(directory_error)?;
        tracing::info!(key = %public_key.short_id(), "Published public key");
        Ok(())
    }

    async fn distribute_group_key(
        &self,
        conversation_id: &str,
        keys: &WrappedKeyMap,
    ) -> Result<(), DirectoryError> {
        let token = self.token()?;
        let encrypted_keys = wire_keys(keys)?;

        self.api
            .distribute_group_key(conversation_id, encrypted_keys, &token)
            .await
            .map_err(directory_error)
    }

    async fn my_group_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<WrappedGroupKey>, DirectoryError> {
        let token = self.token()?;
        let response = match self.api.get_group_key(conversation_id, &token).await {
            Ok(response) => response,
            Err(AppError::Api { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(directory_error(e)),
        };

        match response.encrypted_key {
            None => Ok(None),
            Some(text) => WrappedGroupKey::from_wire(&text)
                .map(Some)
                .map_err(|e| DirectoryError::InvalidResponse(format!("wrapped group key: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::crypto::{pairwise, KeyPair};

    #[tokio::test]
    async fn test_requires_session() {
        let api = ApiClient::new(&ClientConfig::default()).unwrap();
        let directory = HttpKeyDirectory::new(api, SessionSlot::new());
        assert_eq!(
            directory.public_key("bob").await.unwrap_err(),
            DirectoryError::NotAuthenticated
        );
        assert_eq!(
            directory.my_group_key("conv").await.unwrap_err(),
            DirectoryError::NotAuthenticated
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            directory_error(AppError::SessionExpired),
            DirectoryError::SessionExpired
        );
        assert_eq!(
            directory_error(AppError::Api {
                status: 500,
                body: "boom".to_string()
            }),
            DirectoryError::Api {
                status: 500,
                body: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_wire_keys_carry_payload_json() {
        let sender = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let payload = pairwise::encrypt("group key", &bob.public, sender.secret()).unwrap();

        let mut keys = WrappedKeyMap::new();
        keys.insert("bob".to_string(), WrappedGroupKey(payload.clone()));

        let wire = wire_keys(&keys).unwrap();
        assert_eq!(wire.len(), 1);
        assert_eq!(
            WrappedGroupKey::from_wire(&wire["bob"]).unwrap(),
            WrappedGroupKey(payload)
        );
    }

    #[test]
    fn test_local_encoding_failure_is_not_a_response_error() {
        let err = encoding_error("bob", CryptoError::MalformedPayload("bad".to_string()));
        assert!(matches!(err, DirectoryError::Encoding(ref msg) if msg.contains("bob")));
    }
}
