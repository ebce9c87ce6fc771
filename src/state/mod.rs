//! Finite-state machines fed by external event streams.
//!
//! Every machine here is synchronous and owns no I/O. The async owners live
//! in [`crate::store`] and [`crate::transport`].

pub mod connection;
pub mod session;
pub mod turn;

pub use connection::{
    ConnectionEffect, ConnectionEvent, ConnectionMachine, ConnectionSnapshot, ConnectionState,
};
pub use session::{AuthEvent, AuthSnapshot, AuthState, SessionMachine};
pub use turn::{
    Message, PendingApproval, Role, ToolExecution, ToolStatus, TurnPhase, TurnSnapshot,
    TurnTracker,
};
