//! Authentication session state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where the authentication session stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    SignedOut,
    SigningIn,
    SignedIn {
        account: String,
        expires_at: Option<DateTime<Utc>>,
    },
    Refreshing {
        account: String,
    },
    /// Credentials lapsed; the user has to sign in again
    Expired {
        account: String,
    },
    Error {
        message: String,
    },
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::SignedOut => "signed_out",
            AuthState::SigningIn => "signing_in",
            AuthState::SignedIn { .. } => "signed_in",
            AuthState::Refreshing { .. } => "refreshing",
            AuthState::Expired { .. } => "expired",
            AuthState::Error { .. } => "error",
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignInStarted,
    SignInSucceeded {
        account: String,
        expires_at: Option<DateTime<Utc>>,
    },
    SignInFailed {
        message: String,
    },
    RefreshStarted,
    Refreshed {
        expires_at: Option<DateTime<Utc>>,
    },
    RefreshFailed {
        message: String,
    },
    /// The server rejected the current credentials
    TokenExpired,
    SignOut,
}

/// Read-only view for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub authenticated: bool,
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: AuthState,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: AuthState::SignedOut,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Whether requests may carry credentials right now.
    /// A refresh in flight still counts: the old token stays valid until it lands.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            AuthState::SignedIn { .. } | AuthState::Refreshing { .. }
        )
    }

    /// Apply an event. Returns whether the state changed.
    /// Events that make no sense in the current state are ignored.
    pub fn apply(&mut self, event: AuthEvent) -> bool {
        let next = match (&self.state, event) {
            (_, AuthEvent::SignOut) => Some(AuthState::SignedOut),

            (
                AuthState::SignedOut | AuthState::Expired { .. } | AuthState::Error { .. },
                AuthEvent::SignInStarted,
            ) => Some(AuthState::SigningIn),

            // A sign-in may complete without an explicit start (token from env, cached session)
            (
                AuthState::SignedOut
                | AuthState::SigningIn
                | AuthState::Expired { .. }
                | AuthState::Error { .. },
                AuthEvent::SignInSucceeded {
                    account,
                    expires_at,
                },
            ) => Some(AuthState::SignedIn {
                account,
                expires_at,
            }),

            (AuthState::SigningIn, AuthEvent::SignInFailed { message }) => {
                Some(AuthState::Error { message })
            }

            (AuthState::SignedIn { account, .. }, AuthEvent::RefreshStarted) => {
                Some(AuthState::Refreshing {
                    account: account.clone(),
                })
            }

            (
                AuthState::Refreshing { account } | AuthState::SignedIn { account, .. },
                AuthEvent::Refreshed { expires_at },
            ) => Some(AuthState::SignedIn {
                account: account.clone(),
                expires_at,
            }),

            (AuthState::Refreshing { account }, AuthEvent::RefreshFailed { message }) => {
                tracing::warn!(account = %account, error = %message, "token refresh failed");
                Some(AuthState::Expired {
                    account: account.clone(),
                })
            }

            (
                AuthState::SignedIn { account, .. } | AuthState::Refreshing { account },
                AuthEvent::TokenExpired,
            ) => Some(AuthState::Expired {
                account: account.clone(),
            }),

            (state, event) => {
                tracing::debug!(state = %state, event = ?event, "ignoring auth event");
                None
            }
        };

        match next {
            Some(next) if next != self.state => {
                tracing::info!(from = %self.state, to = %next, "auth state changed");
                self.state = next;
                true
            }
            _ => false,
        }
    }

    /// Expire a signed-in session whose deadline has passed
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> bool {
        let expired = matches!(
            &self.state,
            AuthState::SignedIn { expires_at: Some(at), .. } if *at <= now
        );
        if expired {
            self.apply(AuthEvent::TokenExpired)
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            state: self.state.clone(),
            authenticated: self.is_authenticated(),
        }
    }
}
