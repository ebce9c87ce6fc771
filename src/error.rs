//! Error types for the supervision and synchronization seams.

use std::io;

/// Errors returned by [`crate::supervisor::Supervisor`] operations
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The agent binary could not be spawned (missing binary, permissions, ...).
    /// Not retried: the configuration has to change first.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid readiness pattern: {0}")]
    Readiness(#[from] regex::Error),

    #[error("No agent process is running")]
    NotRunning,

    #[error("Supervisor task has shut down")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced while opening an event feed
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Server returned status {0}")]
    Status(u16),

    /// Credentials were rejected. Retrying will not help.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Transport closed")]
    Closed,
}

/// Errors produced while decoding a single feed record
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to read from stream: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse event: {message} (record: {record})")]
    Decode { message: String, record: String },
}
