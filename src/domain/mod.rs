//! Core domain types shared by the supervisor, the feed and the state machines

mod event;
mod output;

pub use event::{AgentEnvelope, AgentEvent, UsageStats};
pub use output::{OutputStream, ProcessOutput};
