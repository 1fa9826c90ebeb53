//! Client configuration

use std::time::Duration;

use crate::crypto::cache::DEFAULT_CAPACITY;
use crate::crypto::identity::DEFAULT_STORE_TIMEOUT;
use crate::error::{AppError, AppResult};

pub const DEFAULT_API_URL: &str = "https://ghostrecon-server.fly.dev";
pub const DEFAULT_WS_URL: &str = "wss://ghostrecon-server.fly.dev";

/// Endpoints and timings shared by the HTTP client, key store and channel
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL
    pub api_url: String,

    /// WebSocket base URL
    pub ws_url: String,

    pub request_timeout: Duration,
    pub store_timeout: Duration,

    /// Interval between keepalive pings while connected
    pub keepalive_interval: Duration,

    /// Wait after a dropped connection before redialing
    pub reconnect_delay: Duration,

    /// Wait after a failed dial before retrying
    pub connect_retry_delay: Duration,

    pub shared_secret_cache_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            keepalive_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(3),
            connect_retry_delay: Duration::from_secs(5),
            shared_secret_cache_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Config pointing at `api_url`, with the WebSocket URL derived from it
    pub fn for_api(api_url: &str) -> AppResult<Self> {
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url: derive_ws_url(api_url)?,
            ..Self::default()
        })
    }

    /// Defaults overridden by `GHOSTRECON_*` environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = match std::env::var("GHOSTRECON_API_URL") {
            Ok(api_url) => Self::for_api(&api_url)?,
            Err(_) => Self::default(),
        };

        if let Ok(ws_url) = std::env::var("GHOSTRECON_WS_URL") {
            config.ws_url = ws_url.trim_end_matches('/').to_string();
        }

        if let Ok(secs) = std::env::var("GHOSTRECON_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                AppError::Config(format!("GHOSTRECON_REQUEST_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        tracing::debug!(api_url = %config.api_url, ws_url = %config.ws_url, "Loaded client config");
        Ok(config)
    }
}

/// Swap the API URL scheme for its WebSocket counterpart
pub fn derive_ws_url(api_url: &str) -> AppResult<String> {
    let mut url = url::Url::parse(api_url)?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(AppError::Config(format!(
                "Unsupported API URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config(format!("Cannot derive WebSocket URL from {}", api_url)))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.connect_retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_ws_url_derivation() {
        assert_eq!(derive_ws_url("https://api.example.com").unwrap(), "wss://api.example.com");
        assert_eq!(derive_ws_url("http://127.0.0.1:8001/").unwrap(), "ws://127.0.0.1:8001");
        assert!(derive_ws_url("ftp://example.com").is_err());
        assert!(derive_ws_url("not a url").is_err());
    }

    #[test]
    fn test_for_api() {
        let config = ClientConfig::for_api("http://localhost:8001/").unwrap();
        assert_eq!(config.api_url, "http://localhost:8001");
        assert_eq!(config.ws_url, "ws://localhost:8001");
    }
}
