//! Watch command: follow an event feed without supervising anything

use anyhow::{Result, bail};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

use tether::config::Config;
use tether::state::{AuthEvent, ConnectionState};
use tether::store::{AgentStore, StoreEvent};
use tether::transport::{ConnectionDriver, HttpTransport};

pub async fn watch_command(mut config: Config, url: Option<String>) -> Result<()> {
    if url.is_some() {
        config.connection.url = url;
    }
    let Some(transport) = HttpTransport::from_config(&config.connection, &config.auth) else {
        bail!("No feed URL: pass --url or set [connection] url in the config");
    };

    let store = AgentStore::new(config.sync.clone());
    let mut store_snapshots = store.subscribe();
    let (store_tx, store_rx) = mpsc::channel(1024);
    let store_task = tokio::spawn(store.run(store_rx));

    if config.auth.token().is_some() {
        let _ = store_tx
            .send(StoreEvent::Auth(AuthEvent::SignInSucceeded {
                account: config.auth.account.clone(),
                expires_at: None,
            }))
            .await;
    }

    let connection = ConnectionDriver::spawn(transport, &config.connection, store_tx.clone());
    let mut connection_state = connection.subscribe();
    let mut phases = HashMap::new();
    let mut failure = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            changed = connection_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = connection_state.borrow_and_update().clone();
                println!("connection: {} (retries {}/{})", snapshot.state, snapshot.retries, snapshot.max_retries);
                if let ConnectionState::Failed { reason } = snapshot.state {
                    failure = Some(reason);
                    break;
                }
            }
            changed = store_snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = store_snapshots.borrow_and_update().clone();
                super::report_phase_changes(&snapshot, &mut phases);
            }
        }
    }

    connection.close().await;
    let _ = store_tx.send(StoreEvent::Shutdown).await;
    drop(store_tx);
    let _ = store_task.await;

    match failure {
        Some(reason) => bail!("Event feed failed: {}", reason),
        None => Ok(()),
    }
}
