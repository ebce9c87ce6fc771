//! Init command implementation

use anyhow::{Result, bail};
use std::path::PathBuf;

use tether::config::Config;

/// Default configuration content for tether init
pub const DEFAULT_CONFIG: &str = r#"# Tether Configuration
# ====================
#
# Tether keeps a local AI coding agent running and mirrors its session
# state from the agent's event feed.

# ============================================================================
# AGENT - The binary to supervise
# ============================================================================

[agent]
program = "opencode"
args = ["serve", "--hostname", "127.0.0.1", "--port", "4096"]
# cwd = "/path/to/project"

# Extra environment for the agent process
[agent.env]

# ============================================================================
# SUPERVISOR - Restarts, readiness and shutdown
# ============================================================================
#
# restart_policy      - "always" (default), "on-failure" or "never"
# max_restarts        - Automatic restarts before giving up (0 = never restart)
# ready_timeout_ms    - Time allowed to pass the readiness probe; a timeout counts as a crash
# stable_after_ms     - A run that stays up this long resets the restart counter
# shutdown_grace_ms   - Time between SIGTERM and SIGKILL
# output_buffer_lines - Recent stdout/stderr lines kept in memory

[supervisor]
restart_policy = "always"
max_restarts = 5
ready_timeout_ms = 30000
stable_after_ms = 60000
shutdown_grace_ms = 5000
output_buffer_lines = 500

[supervisor.backoff]
initial_delay_ms = 1000
max_delay_ms = 30000
multiplier = 2.0

# Readiness probe. One of:
#   kind = "none"
#   kind = "stdout", pattern = "listening on (http://\\S+)"   (group 1 = endpoint)
#   kind = "http",   url = "http://127.0.0.1:4096/health", interval_ms = 250
[supervisor.readiness]
kind = "stdout"
pattern = "listening on (http://\\S+)"

# ============================================================================
# CONNECTION - Realtime event feed
# ============================================================================
#
# url     - Feed URL; leave unset to run without a feed
# format  - "sse" (default) or "ndjson"

[connection]
# url = "http://127.0.0.1:4096/event"
format = "sse"
max_retries = 10
connect_timeout_ms = 5000
read_timeout_ms = 0

[connection.backoff]
initial_delay_ms = 500
max_delay_ms = 10000
multiplier = 2.0

# ============================================================================
# AUTH / SYNC
# ============================================================================

[auth]
# Bearer token for the feed is read from this environment variable
token_env = "TETHER_TOKEN"
account = "local"

[sync]
first_seq = 1
max_pending_events = 256
"#;

/// Write the documented default config
pub async fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Config::global_config_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    Config::write_raw(&config_path, DEFAULT_CONFIG)?;
    println!("Created: {}", config_path.display());

    Ok(())
}
