//! GhostRecon - Headless messaging core
//!
//! This crate holds the end-to-end encryption core of the GhostRecon
//! client (identity keys, pairwise and group encryption, key rotation,
//! fingerprints) and the realtime transport that delivers ciphertext to
//! in-process subscribers. Rendering and navigation live elsewhere.

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod realtime;
pub mod state;

pub use config::ClientConfig;
pub use error::{AppError, AppResult};
pub use state::{SecureClient, SessionSlot, UserSession};

/// Install the global tracing subscriber
///
/// Honours `RUST_LOG`, defaulting to `ghostrecon_core=info`. Calling it
/// more than once is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ghostrecon_core=info".into()),
        )
        .try_init();
}
