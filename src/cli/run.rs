//! Run command: supervise the agent until Ctrl-C

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use tether::config::Config;
use tether::state::AuthEvent;
use tether::store::{AgentStore, StoreEvent};
use tether::supervisor::{ProcessState, Supervisor};
use tether::transport::{ConnectionDriver, HttpTransport};

/// Store events queued before producers have to wait
const STORE_QUEUE_CAPACITY: usize = 1024;

/// Supervise the configured agent (or `command` when given).
/// With `watch`, also follow the event feed and print turn phase changes.
pub async fn run_command(config: Config, command: Vec<String>, watch: bool) -> Result<()> {
    let mut supervisor_config = config.supervisor_config();
    if let Some((program, args)) = command.split_first() {
        supervisor_config.command.program = program.clone();
        supervisor_config.command.args = args.to_vec();
    }
    info!(command = %supervisor_config.command.display(), "supervising agent");

    let supervisor =
        Supervisor::new(supervisor_config).context("Invalid supervisor configuration")?;
    supervisor.start().await.context("Failed to start agent")?;

    let store = AgentStore::new(config.sync.clone());
    let mut store_snapshots = store.subscribe();
    let (store_tx, store_rx) = mpsc::channel(STORE_QUEUE_CAPACITY);
    let store_task = tokio::spawn(store.run(store_rx));

    if config.auth.token().is_some() {
        let _ = store_tx
            .send(StoreEvent::Auth(AuthEvent::SignInSucceeded {
                account: config.auth.account.clone(),
                expires_at: None,
            }))
            .await;
    }

    let connection = if watch {
        match HttpTransport::from_config(&config.connection, &config.auth) {
            Some(transport) => Some(ConnectionDriver::spawn(
                transport,
                &config.connection,
                store_tx.clone(),
            )),
            None => {
                warn!("--watch given but [connection] url is not set; not following the feed");
                None
            }
        }
    } else {
        None
    };

    let mut output = supervisor.output();
    let mut process = supervisor.subscribe();
    let mut phases = HashMap::new();
    let mut gave_up: Option<ProcessState> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping agent");
                break;
            }
            line = output.recv() => match line {
                Ok(out) => println!("[{} #{}] {}", out.stream, out.generation, out.line),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output reader fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = process.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = process.borrow_and_update().clone();
                let _ = store_tx.send(StoreEvent::Process(snapshot.clone())).await;
                if snapshot.state.is_terminal() {
                    gave_up = Some(snapshot.state);
                    break;
                }
            }
            changed = store_snapshots.changed(), if watch => {
                if changed.is_err() {
                    break;
                }
                let snapshot = store_snapshots.borrow_and_update().clone();
                super::report_phase_changes(&snapshot, &mut phases);
            }
        }
    }

    supervisor.shutdown().await?;
    if let Some(connection) = connection {
        connection.close().await;
    }
    let _ = store_tx.send(StoreEvent::Shutdown).await;
    drop(store_tx);
    let final_state = store_task.await.context("Store task failed")?;
    info!(sessions = final_state.sessions.len(), "stopped");

    match gave_up {
        Some(ProcessState::Stopped) | None => Ok(()),
        Some(state) => bail!("Agent is down: {}", describe(&state)),
    }
}

fn describe(state: &ProcessState) -> String {
    match state {
        ProcessState::Exited { code } => format!("exited with code {:?}", code),
        ProcessState::SpawnFailed { message } => format!("spawn failed: {}", message),
        ProcessState::MaxRestartsReached { restarts } => {
            format!("gave up after {} restarts", restarts)
        }
        other => other.to_string(),
    }
}
