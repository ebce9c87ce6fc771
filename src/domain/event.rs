//! Agent event types received from the event feed.

use serde::{Deserialize, Serialize};

/// Token usage statistics
///
/// Accepts both the `cacheReadTokens` and `cachedInputTokens` spellings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
}

impl UsageStats {
    /// Get effective cache read tokens (either spelling)
    pub fn effective_cache_read(&self) -> u64 {
        self.cache_read_tokens.or(self.cached_input_tokens).unwrap_or(0)
    }

    /// Add another usage record into this one
    pub fn accumulate(&mut self, other: &UsageStats) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        let cache_read = self.effective_cache_read() + other.effective_cache_read();
        self.cache_read_tokens = Some(cache_read);
        self.cached_input_tokens = None;
        self.cache_write_tokens = match (self.cache_write_tokens, other.cache_write_tokens) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };
    }
}

/// One record of the event feed: routing fields plus the event itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEnvelope {
    pub session_id: String,

    /// Per-session sequence number. Absent on feeds that do not number events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: u64,

    #[serde(flatten)]
    pub event: AgentEvent,
}

impl AgentEnvelope {
    pub fn new(session_id: impl Into<String>, event: AgentEvent) -> Self {
        Self {
            session_id: session_id.into(),
            seq: None,
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
            event,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// Agent event - union of everything the feed can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// Session opened on the agent side
    #[serde(rename = "session.start")]
    SessionStart {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
    },

    /// User input that starts a turn
    #[serde(rename = "user.message", rename_all = "camelCase")]
    UserMessage {
        #[serde(default)]
        message_id: Option<String>,
        text: String,
    },

    /// The agent is calling the model (again)
    #[serde(rename = "model.start")]
    ModelStart {
        #[serde(default)]
        model: Option<String>,
    },

    /// Assistant text; `partial` deltas are appended to the open message
    #[serde(rename = "text", rename_all = "camelCase")]
    Text {
        #[serde(default)]
        message_id: Option<String>,
        content: String,
        #[serde(default)]
        partial: bool,
    },

    #[serde(rename = "tool.use", rename_all = "camelCase")]
    ToolUse {
        tool_use_id: String,
        tool_name: String,
        #[serde(default)]
        tool_input: serde_json::Value,
    },

    #[serde(rename = "tool.result", rename_all = "camelCase")]
    ToolResult {
        tool_use_id: String,
        success: bool,
        #[serde(default)]
        output: String,
    },

    /// A tool call is waiting for a user decision
    #[serde(rename = "tool.approval_needed", rename_all = "camelCase")]
    ToolApprovalNeeded {
        request_id: String,
        tool_name: String,
        #[serde(default)]
        tool_input: serde_json::Value,
    },

    #[serde(rename = "hook.start", rename_all = "camelCase")]
    HookStart {
        hook_name: String,
        #[serde(default)]
        tool_use_id: Option<String>,
    },

    #[serde(rename = "hook.end", rename_all = "camelCase")]
    HookEnd {
        hook_name: String,
        #[serde(default = "default_true")]
        success: bool,
    },

    /// The turn finished
    #[serde(rename = "session.complete", rename_all = "camelCase")]
    SessionComplete {
        success: bool,
        #[serde(default)]
        usage: Option<UsageStats>,
        #[serde(default)]
        cost_usd: Option<f64>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },

    /// Request-level failure, surfaced to the user as a message
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },

    /// Keep-alive, carries no state
    #[serde(rename = "heartbeat")]
    Heartbeat,

    /// The agent is going away; the session is finished for good
    #[serde(rename = "shutdown")]
    Shutdown {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Event types this client does not know about
    #[serde(other)]
    Unknown,
}

fn default_true() -> bool {
    true
}

impl AgentEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::SessionStart { .. } => "session.start",
            AgentEvent::UserMessage { .. } => "user.message",
            AgentEvent::ModelStart { .. } => "model.start",
            AgentEvent::Text { .. } => "text",
            AgentEvent::ToolUse { .. } => "tool.use",
            AgentEvent::ToolResult { .. } => "tool.result",
            AgentEvent::ToolApprovalNeeded { .. } => "tool.approval_needed",
            AgentEvent::HookStart { .. } => "hook.start",
            AgentEvent::HookEnd { .. } => "hook.end",
            AgentEvent::SessionComplete { .. } => "session.complete",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Heartbeat => "heartbeat",
            AgentEvent::Shutdown { .. } => "shutdown",
            AgentEvent::Unknown => "unknown",
        }
    }
}
