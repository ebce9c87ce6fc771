//! Supervisor settings: restart policy, backoff, readiness and shutdown

use serde::{Deserialize, Serialize};

use super::AgentCommand;

/// When an exited agent should be restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Restart on any exit (the agent is a long-lived server)
    #[default]
    Always,
    /// Restart only on a non-zero exit code or signal
    OnFailure,
    /// Never restart
    Never,
}

impl RestartPolicy {
    /// Whether an exit with this code warrants a restart.
    /// `None` means the process was terminated by a signal.
    pub fn should_restart(&self, exit_code: Option<i32>) -> bool {
        match self {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => exit_code != Some(0),
            RestartPolicy::Never => false,
        }
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// How the supervisor decides a freshly spawned agent is ready
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReadinessProbe {
    /// Ready as soon as the spawn succeeds
    #[default]
    None,
    /// Ready when a stdout line matches `pattern` (regex).
    /// Capture group 1, when present, is published as the agent endpoint.
    Stdout { pattern: String },
    /// Ready when `GET url` answers with a 2xx status
    Http {
        url: String,
        #[serde(default = "default_probe_interval_ms")]
        interval_ms: u64,
    },
}

fn default_probe_interval_ms() -> u64 {
    250
}

/// The `[supervisor]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// Maximum automatic restarts before giving up (0 = never restart)
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub readiness: ReadinessProbe,

    /// Time allowed between spawn and readiness before the start counts as a crash
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// A run that stays up this long resets the restart counter
    #[serde(default = "default_stable_after_ms")]
    pub stable_after_ms: u64,

    /// Time between SIGTERM and SIGKILL on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Number of recent stdout/stderr lines kept in memory
    #[serde(default = "default_output_buffer_lines")]
    pub output_buffer_lines: usize,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn default_stable_after_ms() -> u64 {
    60_000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_output_buffer_lines() -> usize {
    500
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::default(),
            max_restarts: default_max_restarts(),
            backoff: BackoffConfig::default(),
            readiness: ReadinessProbe::default(),
            ready_timeout_ms: default_ready_timeout_ms(),
            stable_after_ms: default_stable_after_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            output_buffer_lines: default_output_buffer_lines(),
        }
    }
}

/// Everything a supervisor needs to run one agent
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    pub command: AgentCommand,
    pub settings: SupervisorSettings,
}

impl SupervisorConfig {
    pub fn new(command: AgentCommand) -> Self {
        Self {
            command,
            settings: SupervisorSettings::default(),
        }
    }
}
