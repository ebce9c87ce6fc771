//! Conversation turn state, rebuilt from a streamed event feed.
//!
//! One [`TurnTracker`] follows one agent session. Numbered events pass
//! through a [`ReorderBuffer`] first, so the tracker always sees them in
//! sequence order no matter how the feed delivered them.

mod reorder;
mod types;

pub use reorder::ReorderBuffer;
pub use types::{Message, PendingApproval, Role, ToolExecution, ToolStatus, TurnPhase, TurnSnapshot};

use crate::config::SyncConfig;
use crate::domain::{AgentEnvelope, AgentEvent, UsageStats};

#[derive(Debug, Clone)]
pub struct TurnTracker {
    session_id: String,
    phase: TurnPhase,
    /// Phase to return to when the running hook ends
    hook_return: Option<TurnPhase>,
    model: Option<String>,
    messages: Vec<Message>,
    tools: Vec<ToolExecution>,
    pending_approval: Option<PendingApproval>,
    turns: u32,
    last_error: Option<String>,
    usage: UsageStats,
    cost_usd: f64,
    applied: u64,
    reorder: ReorderBuffer<AgentEnvelope>,
}

impl TurnTracker {
    pub fn new(session_id: impl Into<String>, sync: &SyncConfig) -> Self {
        Self {
            session_id: session_id.into(),
            phase: TurnPhase::Waiting,
            hook_return: None,
            model: None,
            messages: Vec::new(),
            tools: Vec::new(),
            pending_approval: None,
            turns: 0,
            last_error: None,
            usage: UsageStats::default(),
            cost_usd: 0.0,
            applied: 0,
            reorder: ReorderBuffer::new(sync.first_seq, sync.max_pending_events),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &[ToolExecution] {
        &self.tools
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn is_shutdown(&self) -> bool {
        self.phase == TurnPhase::Shutdown
    }

    /// Feed one envelope. Returns how many events were applied, which can be
    /// zero (buffered, replayed, or after shutdown) or more than one (a gap
    /// just filled).
    pub fn push(&mut self, envelope: AgentEnvelope) -> usize {
        if self.is_shutdown() {
            tracing::debug!(
                session = %self.session_id,
                kind = envelope.event.kind(),
                "session is shut down, ignoring event"
            );
            return 0;
        }

        let ready = match envelope.seq {
            Some(seq) => self.reorder.push(seq, envelope),
            None => vec![envelope],
        };

        let mut applied = 0;
        for envelope in ready {
            if self.is_shutdown() {
                break;
            }
            self.apply(envelope);
            applied += 1;
        }
        applied
    }

    /// Force the session into its terminal phase
    pub fn shutdown(&mut self, reason: Option<&str>) {
        if self.is_shutdown() {
            return;
        }
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.close_turn(now);
        tracing::info!(
            session = %self.session_id,
            reason = reason.unwrap_or("none"),
            "session shut down"
        );
        self.set_phase(TurnPhase::Shutdown);
    }

    fn apply(&mut self, envelope: AgentEnvelope) {
        self.applied += 1;
        let at = envelope.timestamp;

        match envelope.event {
            AgentEvent::SessionStart { model, tools } => {
                tracing::debug!(session = %self.session_id, tools = tools.len(), "session started");
                if model.is_some() {
                    self.model = model;
                }
            }

            AgentEvent::UserMessage { message_id, text } => {
                self.complete_assistant_messages();
                self.last_error = None;
                let id = message_id.unwrap_or_else(synthesized_id);
                self.messages.push(Message {
                    id,
                    role: Role::User,
                    text,
                    complete: true,
                    timestamp: at,
                });
                self.hook_return = None;
                self.set_phase(TurnPhase::CallingModel);
            }

            AgentEvent::ModelStart { model } => {
                if model.is_some() {
                    self.model = model;
                }
                self.hook_return = None;
                self.set_phase(TurnPhase::CallingModel);
            }

            AgentEvent::Text {
                message_id,
                content,
                partial,
            } => {
                self.append_text(message_id, content, partial, at);
                if self.phase == TurnPhase::Waiting {
                    self.set_phase(TurnPhase::CallingModel);
                }
            }

            AgentEvent::ToolUse {
                tool_use_id,
                tool_name,
                tool_input,
            } => {
                self.clear_approval_for(&tool_name);
                if self.tools.iter().any(|t| t.id == tool_use_id) {
                    tracing::debug!(tool_use_id = %tool_use_id, "tool already recorded");
                    return;
                }
                self.complete_assistant_messages();
                self.tools.push(ToolExecution {
                    id: tool_use_id,
                    name: tool_name,
                    input: tool_input,
                    status: ToolStatus::Running,
                    output: None,
                    started_at: at,
                    finished_at: None,
                });
                self.hook_return = None;
                self.set_phase(TurnPhase::ToolExecution);
            }

            AgentEvent::ToolResult {
                tool_use_id,
                success,
                output,
            } => {
                self.finish_tool(tool_use_id, success, output, at);
                if !self.has_running_tools() {
                    match self.phase {
                        TurnPhase::ToolExecution => self.set_phase(TurnPhase::CallingModel),
                        TurnPhase::Hook if self.hook_return == Some(TurnPhase::ToolExecution) => {
                            self.hook_return = Some(TurnPhase::CallingModel);
                        }
                        _ => {}
                    }
                }
            }

            AgentEvent::ToolApprovalNeeded {
                request_id,
                tool_name,
                tool_input,
            } => {
                tracing::info!(
                    session = %self.session_id,
                    request_id = %request_id,
                    tool = %tool_name,
                    "tool approval needed"
                );
                self.pending_approval = Some(PendingApproval {
                    request_id,
                    tool_name,
                    tool_input,
                });
            }

            AgentEvent::HookStart { hook_name, .. } => {
                tracing::debug!(session = %self.session_id, hook = %hook_name, "hook started");
                if self.phase != TurnPhase::Hook {
                    self.hook_return = Some(self.phase);
                    self.set_phase(TurnPhase::Hook);
                }
            }

            AgentEvent::HookEnd { hook_name, success } => {
                if self.phase != TurnPhase::Hook {
                    tracing::debug!(hook = %hook_name, phase = %self.phase, "hook end outside a hook");
                    return;
                }
                if !success {
                    tracing::warn!(session = %self.session_id, hook = %hook_name, "hook failed");
                }
                let next = if self.has_running_tools() {
                    TurnPhase::ToolExecution
                } else {
                    TurnPhase::CallingModel
                };
                self.hook_return = None;
                self.set_phase(next);
            }

            AgentEvent::SessionComplete {
                success,
                usage,
                cost_usd,
                duration_ms,
            } => {
                if let Some(usage) = usage {
                    self.usage.accumulate(&usage);
                }
                self.cost_usd += cost_usd.unwrap_or(0.0);
                self.turns += 1;
                tracing::info!(
                    session = %self.session_id,
                    success,
                    turns = self.turns,
                    duration_ms = duration_ms.unwrap_or(0),
                    "turn complete"
                );
                self.close_turn(at);
                self.set_phase(TurnPhase::Waiting);
            }

            AgentEvent::Error { message, code } => {
                tracing::warn!(
                    session = %self.session_id,
                    code = code.as_deref().unwrap_or(""),
                    error = %message,
                    "agent reported an error"
                );
                self.last_error = Some(message);
                self.close_turn(at);
                self.set_phase(TurnPhase::Waiting);
            }

            AgentEvent::Heartbeat => {}

            AgentEvent::Shutdown { reason } => {
                self.close_turn(at);
                tracing::info!(
                    session = %self.session_id,
                    reason = reason.as_deref().unwrap_or("none"),
                    "agent shut the session down"
                );
                self.set_phase(TurnPhase::Shutdown);
            }

            AgentEvent::Unknown => {
                tracing::debug!(session = %self.session_id, "ignoring unknown event type");
            }
        }
    }

    fn set_phase(&mut self, next: TurnPhase) {
        if next != self.phase {
            tracing::debug!(session = %self.session_id, from = %self.phase, to = %next, "turn phase changed");
            self.phase = next;
        }
    }

    fn has_running_tools(&self) -> bool {
        self.tools.iter().any(|t| t.status == ToolStatus::Running)
    }

    fn append_text(&mut self, message_id: Option<String>, content: String, partial: bool, at: u64) {
        let open = self
            .messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant && !m.complete);

        match open {
            Some(message) if message_id.is_none() || message_id.as_deref() == Some(message.id.as_str()) => {
                if partial {
                    message.text.push_str(&content);
                } else {
                    message.text = content;
                    message.complete = true;
                }
            }
            other => {
                if let Some(previous) = other {
                    previous.complete = true;
                }
                let id = message_id.unwrap_or_else(synthesized_id);
                self.messages.push(Message {
                    id,
                    role: Role::Assistant,
                    text: content,
                    complete: !partial,
                    timestamp: at,
                });
            }
        }
    }

    fn finish_tool(&mut self, tool_use_id: String, success: bool, output: String, at: u64) {
        let status = if success {
            ToolStatus::Completed
        } else {
            ToolStatus::Failed
        };

        match self.tools.iter_mut().find(|t| t.id == tool_use_id) {
            Some(tool) if tool.status == ToolStatus::Running => {
                tool.status = status;
                tool.output = Some(output);
                tool.finished_at = Some(at);
            }
            Some(tool) => {
                tracing::debug!(tool_use_id = %tool.id, status = ?tool.status, "tool already finished");
            }
            None => {
                tracing::warn!(
                    session = %self.session_id,
                    tool_use_id = %tool_use_id,
                    "result for a tool that was never started"
                );
                self.tools.push(ToolExecution {
                    id: tool_use_id.clone(),
                    name: "unknown".to_string(),
                    input: serde_json::Value::Null,
                    status,
                    output: Some(output),
                    started_at: at,
                    finished_at: Some(at),
                });
            }
        }

        let name = self
            .tools
            .iter()
            .find(|t| t.id == tool_use_id)
            .map(|t| t.name.clone());
        if let Some(name) = name {
            self.clear_approval_for(&name);
        }
    }

    fn clear_approval_for(&mut self, tool_name: &str) {
        if self
            .pending_approval
            .as_ref()
            .is_some_and(|a| a.tool_name == tool_name)
        {
            self.pending_approval = None;
        }
    }

    fn complete_assistant_messages(&mut self) {
        for message in self.messages.iter_mut().filter(|m| m.role == Role::Assistant) {
            message.complete = true;
        }
    }

    /// End-of-turn cleanup shared by completion, errors and shutdown
    fn close_turn(&mut self, at: u64) {
        self.complete_assistant_messages();
        for tool in self.tools.iter_mut().filter(|t| t.status == ToolStatus::Running) {
            tool.status = ToolStatus::Cancelled;
            tool.finished_at = Some(at);
        }
        self.pending_approval = None;
        self.hook_return = None;
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            model: self.model.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            pending_approval: self.pending_approval.clone(),
            turns: self.turns,
            last_error: self.last_error.clone(),
            usage: self.usage.clone(),
            cost_usd: self.cost_usd,
            applied_events: self.applied,
            duplicate_events: self.reorder.duplicates(),
            skipped_events: self.reorder.skipped(),
        }
    }
}

/// Id for a message the feed did not name
fn synthesized_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
