//! Configuration loading and management

mod agent;
mod connection;
mod io;
mod supervisor;

pub use agent::AgentCommand;
pub use connection::{AuthConfig, ConnectionConfig, SyncConfig};
pub use supervisor::{
    BackoffConfig, ReadinessProbe, RestartPolicy, SupervisorConfig, SupervisorSettings,
};

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// The agent binary to supervise
    #[serde(default)]
    pub agent: AgentCommand,

    /// Restart, readiness and shutdown behavior
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Realtime event feed
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Credentials for the event feed
    #[serde(default)]
    pub auth: AuthConfig,

    /// Event reordering
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// The supervisor's runtime configuration: the `[agent]` command plus the
    /// `[supervisor]` settings.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            command: self.agent.clone(),
            settings: self.supervisor.clone(),
        }
    }
}
