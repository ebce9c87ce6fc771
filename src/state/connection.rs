//! Realtime connection state machine with bounded reconnects.
//!
//! The machine is pure: [`ConnectionMachine::apply`] returns the effect the
//! owner has to carry out (open the transport, arm the retry timer, tear down).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backoff::Backoff;
use crate::config::BackoffConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting {
        attempt: u32,
    },
    Connected {
        since: DateTime<Utc>,
    },
    Reconnecting {
        attempt: u32,
        retry_in_ms: u64,
    },
    /// Retries exhausted or the server refused us; needs an explicit `Connect`
    Failed {
        reason: String,
    },
    Closed,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Connected { .. } => "connected",
            ConnectionState::Reconnecting { .. } => "reconnecting",
            ConnectionState::Failed { .. } => "failed",
            ConnectionState::Closed => "closed",
        }
    }

    /// States that only an explicit `Connect` leaves
    pub fn accepts_connect(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Failed { .. } | ConnectionState::Closed
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// User asked to connect
    Connect,
    /// Transport is open and streaming
    Opened,
    /// Transport failed or the stream ended; retryable
    Dropped { reason: String },
    /// Server refused the connection; not retryable
    Rejected { reason: String },
    /// The retry timer fired
    RetryElapsed,
    /// User asked to disconnect
    Close,
}

/// Work the owner of the machine has to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEffect {
    Open,
    ScheduleRetry(Duration),
    Shutdown,
}

/// Read-only view for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub retries: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            retries: 0,
            max_retries: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    backoff: Backoff,
    last_error: Option<String>,
}

impl ConnectionMachine {
    pub fn new(backoff: BackoffConfig, max_retries: u32) -> Self {
        Self {
            state: ConnectionState::Idle,
            backoff: Backoff::new(backoff, max_retries),
            last_error: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Reconnect attempts since the last successful open
    pub fn retries(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn max_retries(&self) -> u32 {
        self.backoff.max_attempts()
    }

    pub fn apply(&mut self, event: ConnectionEvent) -> Option<ConnectionEffect> {
        let (next, effect) = match (&self.state, event) {
            (_, ConnectionEvent::Close) => (ConnectionState::Closed, Some(ConnectionEffect::Shutdown)),

            (state, ConnectionEvent::Connect) if state.accepts_connect() => {
                self.backoff.reset();
                self.last_error = None;
                (
                    ConnectionState::Connecting { attempt: 1 },
                    Some(ConnectionEffect::Open),
                )
            }

            (ConnectionState::Connecting { .. }, ConnectionEvent::Opened) => {
                self.backoff.reset();
                (ConnectionState::Connected { since: Utc::now() }, None)
            }

            (
                ConnectionState::Connecting { .. } | ConnectionState::Connected { .. },
                ConnectionEvent::Dropped { reason },
            ) => {
                self.last_error = Some(reason.clone());
                match self.backoff.next_delay() {
                    Some(delay) => (
                        ConnectionState::Reconnecting {
                            attempt: self.backoff.attempt(),
                            retry_in_ms: delay.as_millis() as u64,
                        },
                        Some(ConnectionEffect::ScheduleRetry(delay)),
                    ),
                    None => (ConnectionState::Failed { reason }, None),
                }
            }

            (
                ConnectionState::Connecting { .. }
                | ConnectionState::Connected { .. }
                | ConnectionState::Reconnecting { .. },
                ConnectionEvent::Rejected { reason },
            ) => {
                self.last_error = Some(reason.clone());
                (ConnectionState::Failed { reason }, None)
            }

            (ConnectionState::Reconnecting { attempt, .. }, ConnectionEvent::RetryElapsed) => (
                ConnectionState::Connecting {
                    attempt: attempt + 1,
                },
                Some(ConnectionEffect::Open),
            ),

            (state, event) => {
                tracing::debug!(state = %state, event = ?event, "ignoring connection event");
                return None;
            }
        };

        if next != self.state {
            tracing::info!(
                from = %self.state,
                to = %next,
                retries = self.backoff.attempt(),
                "connection state changed"
            );
        }
        self.state = next;
        effect
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state.clone(),
            retries: self.retries(),
            max_retries: self.max_retries(),
            last_error: self.last_error.clone(),
        }
    }
}
