//! GhostRecon probe
//!
//! Opens the local identity for a signed-in user, publishes its public key,
//! connects the realtime channel and logs every event until Ctrl-C.
//!
//! Environment: `GHOSTRECON_USER_ID`, `GHOSTRECON_TOKEN`, optional
//! `GHOSTRECON_DB` plus the `GHOSTRECON_*` client config variables.

use std::sync::Arc;

use anyhow::Context;
use ghostrecon_core::crypto::KeyStore;
use ghostrecon_core::db::{open_pool, SqliteKeyStore};
use ghostrecon_core::realtime::InboundEvent;
use ghostrecon_core::{init_logging, ClientConfig, SecureClient, SessionSlot, UserSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let user_id = std::env::var("GHOSTRECON_USER_ID").context("GHOSTRECON_USER_ID is not set")?;
    let token = std::env::var("GHOSTRECON_TOKEN").context("GHOSTRECON_TOKEN is not set")?;
    let db_path = std::env::var("GHOSTRECON_DB").unwrap_or_else(|_| "ghostrecon.db".to_string());

    let config = ClientConfig::from_env()?;
    let pool = open_pool(&db_path).await?;
    let store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::new(pool).await?);
    let session = SessionSlot::with_session(UserSession::new(user_id, token));

    let client = SecureClient::open(config, store, session)?;
    let public = client
        .publish_identity()
        .await
        .context("publishing identity key")?;
    tracing::info!(
        fingerprint = %public.fingerprint(),
        "Identity ready"
    );

    let _events = client.channel().subscribe(|event| match event {
        InboundEvent::NewMessage { message } => tracing::info!(
            conversation = %message.conversation_id,
            sender = %message.sender_id,
            "New message"
        ),
        InboundEvent::Unknown { kind, .. } => {
            tracing::info!(kind = %kind, "Unhandled realtime event")
        }
        other => tracing::info!(kind = other.kind(), "Realtime event"),
    });

    let mut states = client.channel().watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(%state, "Connection state");
        }
    });

    client.channel().connect()?;

    tokio::signal::ctrl_c().await?;
    client.close();
    Ok(())
}
