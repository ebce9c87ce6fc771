//! CLI command implementations

pub mod init;
pub mod replay;
pub mod run;
pub mod watch;

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

use tether::config::Config;
use tether::state::TurnPhase;
use tether::store::StoreSnapshot;

/// Load `--config` if given, otherwise ~/.tether/config.toml (created on first use)
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

/// Print one line per session whose turn phase changed since the last call
pub fn report_phase_changes(snapshot: &StoreSnapshot, seen: &mut HashMap<String, TurnPhase>) {
    for (session_id, session) in &snapshot.sessions {
        let previous = seen.insert(session_id.clone(), session.phase);
        if previous == Some(session.phase) {
            continue;
        }
        match &session.last_error {
            Some(error) if session.phase == TurnPhase::Waiting => {
                println!("[{}] {} (error: {})", session_id, session.phase, error)
            }
            _ => println!(
                "[{}] {} (turns: {}, messages: {}, tools: {})",
                session_id,
                session.phase,
                session.turns,
                session.messages.len(),
                session.tools.len()
            ),
        }
    }
}
