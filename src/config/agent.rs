//! Agent command configuration

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The agent binary the supervisor spawns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    /// Binary name or path (resolved through PATH)
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments passed to the binary
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory (defaults to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the child
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_program() -> String {
    "opencode".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "serve".to_string(),
        "--hostname".to_string(),
        "127.0.0.1".to_string(),
        "--port".to_string(),
        "4096".to_string(),
    ]
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            cwd: None,
            env: HashMap::new(),
        }
    }
}

impl AgentCommand {
    /// Create a command for a program with arguments
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}
