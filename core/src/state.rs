//! Client state and composition root
//!
//! [`SessionSlot`] is the single source of the signed-in user's bearer
//! token; the HTTP directory and the realtime channel both read it.
//! [`SecureClient`] wires the crypto core, the key directory and the
//! realtime channel together for one signed-in user.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::api::{ApiClient, HttpKeyDirectory};
use crate::config::ClientConfig;
use crate::crypto::{
    GroupCrypto, GroupKey, IdentityCrypto, KeyDirectory, KeyStore, PublicKey,
};
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageCreate};
use crate::realtime::{RealtimeChannel, TokenProvider};

/// User session information
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: String,
    pub token: String,
    pub alias: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            alias: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= chrono::Utc::now())
    }
}

/// Shared, swappable session (None if not authenticated)
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<UserSession>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: UserSession) -> Self {
        let slot = Self::new();
        slot.set(session);
        slot
    }

    /// Set user session after successful authentication
    pub fn set(&self, session: UserSession) {
        *self.inner.write() = Some(session);
    }

    /// Clear user session on logout
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// The session, unless absent or expired
    pub fn current(&self) -> Option<UserSession> {
        self.inner
            .read()
            .as_ref()
            .filter(|session| !session.is_expired())
            .cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Require authentication, returning error if not authenticated
    pub fn require(&self) -> AppResult<UserSession> {
        let guard = self.inner.read();
        match guard.as_ref() {
            None => Err(AppError::NotAuthenticated),
            Some(session) if session.is_expired() => Err(AppError::SessionExpired),
            Some(session) => Ok(session.clone()),
        }
    }
}

impl TokenProvider for SessionSlot {
    fn token(&self) -> Option<String> {
        self.current().map(|session| session.token)
    }
}

/// Everything one signed-in user needs for encrypted messaging
pub struct SecureClient {
    session: SessionSlot,
    api: ApiClient,
    directory: Arc<dyn KeyDirectory>,
    identity: Arc<IdentityCrypto>,
    groups: GroupCrypto,
    channel: RealtimeChannel,
}

impl SecureClient {
    /// Build the client for the user in `session`
    ///
    /// The identity is scoped to the session's user id, so several users
    /// can share one key store.
    pub fn open(
        config: ClientConfig,
        store: Arc<dyn KeyStore>,
        session: SessionSlot,
    ) -> AppResult<Self> {
        let user = session.require()?;
        let api = ApiClient::new(&config)?;
        let directory: Arc<dyn KeyDirectory> =
            Arc::new(HttpKeyDirectory::new(api.clone(), session.clone()));

        let identity = Arc::new(
            IdentityCrypto::new(store, user.user_id.clone())
                .with_store_timeout(config.store_timeout)
                .with_cache_capacity(config.shared_secret_cache_capacity),
        );
        let groups = GroupCrypto::new(identity.clone(), directory.clone());
        let channel = RealtimeChannel::new(&config, Arc::new(session.clone()));

        tracing::info!(user = %user.user_id, api_url = %config.api_url, "Secure client opened");

        Ok(Self {
            session,
            api,
            directory,
            identity,
            groups,
            channel,
        })
    }

    pub fn session(&self) -> &SessionSlot {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn identity(&self) -> &Arc<IdentityCrypto> {
        &self.identity
    }

    pub fn groups(&self) -> &GroupCrypto {
        &self.groups
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }

    /// Ensure a key pair exists and publish its public key
    pub async fn publish_identity(&self) -> AppResult<PublicKey> {
        let public = self.identity.public_key().await?;
        self.directory.publish_public_key(&public).await?;
        Ok(public)
    }

    /// Rotate the identity key pair and publish the new public key
    pub async fn rotate_identity(&self) -> AppResult<PublicKey> {
        let pair = self.identity.rotate_key_pair().await?;
        self.directory.publish_public_key(&pair.public).await?;
        Ok(pair.public)
    }

    /// Encrypt `plaintext` for `recipient_id` and post it to the conversation
    pub async fn send_direct_message(
        &self,
        conversation_id: &str,
        recipient_id: &str,
        plaintext: &str,
    ) -> AppResult<Message> {
        let recipient = self.directory.public_key(recipient_id).await?;
        let payload = self.identity.encrypt(plaintext, &recipient).await?;
        self.post(MessageCreate::new(conversation_id, payload.to_json()?))
            .await
    }

    /// Encrypt `plaintext` with the group key and post it to the conversation
    pub async fn send_group_message(
        &self,
        conversation_id: &str,
        plaintext: &str,
        key: &GroupKey,
    ) -> AppResult<Message> {
        let token = self.groups.encrypt_group_message(plaintext, key)?;
        self.post(MessageCreate::new(conversation_id, token)).await
    }

    /// Disconnect the realtime channel and sign out
    pub fn close(&self) {
        self.channel.disconnect();
        self.session.clear();
        tracing::info!("Secure client closed");
    }

    async fn post(&self, message: MessageCreate) -> AppResult<Message> {
        let token = self.session.require()?.token;
        self.api.send_message(&message, &token).await
    }
}

impl Drop for SecureClient {
    fn drop(&mut self) {
        self.channel.disconnect();
    }
}
