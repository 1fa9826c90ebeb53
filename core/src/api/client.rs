//! HTTP client for the GhostRecon API
//!
//! Handles the key directory and message endpoints of the backend server.

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use std::collections::BTreeMap;

use crate::config::ClientConfig;
use crate::crypto::PublicKey;
use crate::error::{AppError, AppResult};
use crate::models::{
    DistributeKeyRequest, GroupKeyResponse, Message, MessageCreate, PublicKeyResponse,
    PublishKeyRequest,
};

/// API client for the GhostRecon backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ClientConfig) -> AppResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build URL for endpoint
    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Make authenticated GET request
    async fn get<T: DeserializeOwned>(&self, endpoint: &str, token: &str) -> AppResult<T> {
        let response = self
            .client
            .get(self.url(endpoint))
            .bearer_auth(token)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Make authenticated POST request
    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
        token: &str,
    ) -> AppResult<T> {
        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Handle response and parse JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> AppResult<T> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::SessionExpired);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data = response.json().await?;
        Ok(data)
    }

    // ========================================================================
    // Key Endpoints
    // ========================================================================

    /// Get a user's published public key
    pub async fn get_public_key(&self, user_id: &str, token: &str) -> AppResult<PublicKeyResponse> {
        self.get(
            &format!("/api/keys/{}", urlencoding::encode(user_id)),
            token,
        )
        .await
    }

    /// Publish the caller's public key
    pub async fn publish_public_key(&self, public_key: &PublicKey, token: &str) -> AppResult<()> {
        let _: IgnoredAny = self
            .post(
                "/api/keys/publish",
                &PublishKeyRequest {
                    public_key: *public_key,
                },
                token,
            )
            .await?;
        Ok(())
    }

    // ========================================================================
    // Group Key Endpoints
    // ========================================================================

    /// Submit the wrapped group keys for a conversation
    pub async fn distribute_group_key(
        &self,
        conversation_id: &str,
        encrypted_keys: BTreeMap<String, String>,
        token: &str,
    ) -> AppResult<()> {
        let _: IgnoredAny = self
            .post(
                "/api/groups/distribute-key",
                &DistributeKeyRequest {
                    conversation_id: conversation_id.to_string(),
                    encrypted_keys,
                },
                token,
            )
            .await?;
        Ok(())
    }

    /// Get the caller's wrapped key for a conversation
    pub async fn get_group_key(
        &self,
        conversation_id: &str,
        token: &str,
    ) -> AppResult<GroupKeyResponse> {
        self.get(
            &format!("/api/groups/{}/key", urlencoding::encode(conversation_id)),
            token,
        )
        .await
    }

    // ========================================================================
    // Message Endpoints
    // ========================================================================

    /// Post an already encrypted message
    pub async fn send_message(&self, message: &MessageCreate, token: &str) -> AppResult<Message> {
        self.post("/api/messages", message, token).await
    }
}
