//! Tether - keeps a local AI coding agent alive and in sync
//!
//! Tether supervises the agent binary (spawn, readiness, crash restarts with
//! exponential backoff, graceful shutdown) and rebuilds session state from
//! the agent's event feed through small, pure state machines.
//!
//! ## Pieces
//!
//! 1. **Supervisor**: one background task per agent process. See
//!    [`supervisor::Supervisor`].
//!
//! 2. **State machines**: authentication session, realtime connection and
//!    conversation turn. Each has an explicit event type and a read-only
//!    snapshot. See [`state`].
//!
//! 3. **Store**: the single place those machines are driven from. See
//!    [`store::AgentStore`].

pub mod backoff;
pub mod config;
pub mod domain;
pub mod error;
pub mod state;
pub mod store;
pub mod stream;
pub mod supervisor;
pub mod transport;

pub use domain::*;
pub use error::{StreamError, SupervisorError, TransportError};
