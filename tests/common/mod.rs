//! Shared test utilities for the integration tests

#![allow(dead_code)]

use std::time::Duration;

use tether::config::{AgentCommand, BackoffConfig, SupervisorConfig};
use tether::{AgentEnvelope, AgentEvent};
use tokio::sync::watch;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(10);

/// Backoff small enough that crash loops finish quickly
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 10,
        max_delay_ms: 50,
        multiplier: 2.0,
    }
}

/// Supervise `sh -c <script>` with fast restarts
pub fn sh_agent(script: &str) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(AgentCommand::new("sh", ["-c", script]));
    config.settings.backoff = fast_backoff();
    config.settings.shutdown_grace_ms = 2000;
    config
}

/// Wait until a watch channel holds a value matching `pred`
pub async fn wait_for<T: Clone>(
    rx: &mut watch::Receiver<T>,
    what: &str,
    pred: impl FnMut(&T) -> bool,
) -> T {
    match tokio::time::timeout(WAIT, rx.wait_for(pred)).await {
        Ok(Ok(value)) => value.clone(),
        Ok(Err(_)) => panic!("sender went away while waiting for {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

pub fn user(session: &str, id: &str, text: &str) -> AgentEnvelope {
    AgentEnvelope::new(
        session,
        AgentEvent::UserMessage {
            message_id: Some(id.to_string()),
            text: text.to_string(),
        },
    )
}

pub fn text(session: &str, id: &str, content: &str, partial: bool) -> AgentEnvelope {
    AgentEnvelope::new(
        session,
        AgentEvent::Text {
            message_id: Some(id.to_string()),
            content: content.to_string(),
            partial,
        },
    )
}

pub fn tool_use(session: &str, id: &str, name: &str) -> AgentEnvelope {
    AgentEnvelope::new(
        session,
        AgentEvent::ToolUse {
            tool_use_id: id.to_string(),
            tool_name: name.to_string(),
            tool_input: serde_json::json!({}),
        },
    )
}

pub fn tool_result(session: &str, id: &str, success: bool) -> AgentEnvelope {
    AgentEnvelope::new(
        session,
        AgentEvent::ToolResult {
            tool_use_id: id.to_string(),
            success,
            output: "done".to_string(),
        },
    )
}

pub fn complete(session: &str) -> AgentEnvelope {
    AgentEnvelope::new(
        session,
        AgentEvent::SessionComplete {
            success: true,
            usage: None,
            cost_usd: Some(0.01),
            duration_ms: None,
        },
    )
}
