use serde::Serialize;

use crate::domain::UsageStats;

/// Phase of the current conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Idle, waiting for user input
    Waiting,
    /// The model is generating
    CallingModel,
    /// One or more tools are running
    ToolExecution,
    /// A hook is running
    Hook,
    /// The agent shut down; terminal
    Shutdown,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::Waiting => "waiting",
            TurnPhase::CallingModel => "calling_model",
            TurnPhase::ToolExecution => "tool_execution",
            TurnPhase::Hook => "hook",
            TurnPhase::Shutdown => "shutdown",
        }
    }

    /// Whether a turn is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            TurnPhase::CallingModel | TurnPhase::ToolExecution | TurnPhase::Hook
        )
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// No more text will be appended
    pub complete: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Completed,
    Failed,
    /// The turn ended before a result arrived
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExecution {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub status: ToolStatus,
    pub output: Option<String>,
    pub started_at: u64,
    pub finished_at: Option<u64>,
}

/// A tool call waiting for the user's decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingApproval {
    pub request_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
}

/// Read-only view of one session for the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSnapshot {
    pub session_id: String,
    pub phase: TurnPhase,
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolExecution>,
    pub pending_approval: Option<PendingApproval>,
    /// Completed turns
    pub turns: u32,
    /// Last request-level failure, for display
    pub last_error: Option<String>,
    pub usage: UsageStats,
    pub cost_usd: f64,
    pub applied_events: u64,
    pub duplicate_events: u64,
    pub skipped_events: u64,
}
