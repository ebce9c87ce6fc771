//! Event feed connection, auth and sync settings

use serde::{Deserialize, Serialize};

use super::BackoffConfig;
use crate::stream::FeedFormat;

/// The `[connection]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Event feed URL. When unset the feed is not attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub format: FeedFormat,

    /// Reconnect attempts after a drop before the connection is marked failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_connection_backoff")]
    pub backoff: BackoffConfig,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read timeout on the open feed (0 = wait forever; heartbeats keep it alive)
    #[serde(default)]
    pub read_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    10
}

fn default_connection_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 500,
        max_delay_ms: 10_000,
        multiplier: 2.0,
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            format: FeedFormat::default(),
            max_retries: default_max_retries(),
            backoff: default_connection_backoff(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: 0,
        }
    }
}

/// The `[auth]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the bearer token for the feed
    #[serde(default = "default_token_env", skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Account label shown once signed in
    #[serde(default = "default_account")]
    pub account: String,
}

fn default_token_env() -> Option<String> {
    Some("TETHER_TOKEN".to_string())
}

fn default_account() -> String {
    "local".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            account: default_account(),
        }
    }
}

impl AuthConfig {
    /// Read the token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        let var = self.token_env.as_deref()?;
        std::env::var(var).ok().filter(|t| !t.trim().is_empty())
    }
}

/// The `[sync]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sequence number of the first event in a session
    #[serde(default = "default_first_seq")]
    pub first_seq: u64,

    /// Out-of-order events buffered per session before a sequence gap is skipped
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,
}

fn default_first_seq() -> u64 {
    1
}

fn default_max_pending_events() -> usize {
    256
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            first_seq: default_first_seq(),
            max_pending_events: default_max_pending_events(),
        }
    }
}
