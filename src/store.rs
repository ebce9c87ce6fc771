//! Single-threaded dispatch of every external event into the state machines.
//!
//! The store is the one place session state changes. Producers (connection
//! drivers, the supervisor, the CLI) push [`StoreEvent`]s into an `mpsc`
//! queue; [`AgentStore::run`] drains it and publishes a fresh
//! [`StoreSnapshot`] after each event.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::config::SyncConfig;
use crate::domain::AgentEnvelope;
use crate::state::{
    AuthEvent, AuthSnapshot, ConnectionSnapshot, SessionMachine, TurnSnapshot, TurnTracker,
};
use crate::supervisor::SupervisorSnapshot;

/// Everything the store reacts to
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Agent(AgentEnvelope),
    Auth(AuthEvent),
    Connection(ConnectionSnapshot),
    Process(SupervisorSnapshot),
    /// Host is exiting: end every session and sign out
    Shutdown,
}

/// Read-only view of the whole store
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub auth: AuthSnapshot,
    pub connection: ConnectionSnapshot,
    pub process: Option<SupervisorSnapshot>,
    pub sessions: BTreeMap<String, TurnSnapshot>,
    pub shut_down: bool,
}

pub struct AgentStore {
    sync: SyncConfig,
    auth: SessionMachine,
    connection: ConnectionSnapshot,
    process: Option<SupervisorSnapshot>,
    sessions: BTreeMap<String, TurnTracker>,
    shut_down: bool,
    snapshot_tx: watch::Sender<StoreSnapshot>,
}

impl AgentStore {
    pub fn new(sync: SyncConfig) -> Self {
        let auth = SessionMachine::new();
        let initial = StoreSnapshot {
            auth: auth.snapshot(),
            connection: ConnectionSnapshot::default(),
            process: None,
            sessions: BTreeMap::new(),
            shut_down: false,
        };
        let (snapshot_tx, _) = watch::channel(initial);
        Self {
            sync,
            auth,
            connection: ConnectionSnapshot::default(),
            process: None,
            sessions: BTreeMap::new(),
            shut_down: false,
            snapshot_tx,
        }
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn session(&self, session_id: &str) -> Option<&TurnTracker> {
        self.sessions.get(session_id)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Apply one event and publish the result
    pub fn dispatch(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Agent(envelope) if self.shut_down => {
                tracing::debug!(session = %envelope.session_id, "store is shut down, dropping event");
            }
            StoreEvent::Agent(envelope) => {
                let tracker = self
                    .sessions
                    .entry(envelope.session_id.clone())
                    .or_insert_with(|| {
                        tracing::info!(session = %envelope.session_id, "tracking new session");
                        TurnTracker::new(envelope.session_id.clone(), &self.sync)
                    });
                tracker.push(envelope);
            }
            StoreEvent::Auth(event) => {
                self.auth.apply(event);
            }
            StoreEvent::Connection(snapshot) => {
                self.connection = snapshot;
            }
            StoreEvent::Process(snapshot) => {
                self.process = Some(snapshot);
            }
            StoreEvent::Shutdown => {
                tracing::info!(sessions = self.sessions.len(), "store shutting down");
                for tracker in self.sessions.values_mut() {
                    tracker.shutdown(Some("host shutdown"));
                }
                self.auth.apply(AuthEvent::SignOut);
                self.shut_down = true;
            }
        }

        self.auth.check_expiry(chrono::Utc::now());
        self.publish();
    }

    /// Drain the queue until `Shutdown` arrives or every sender is gone
    pub async fn run(mut self, mut rx: mpsc::Receiver<StoreEvent>) -> StoreSnapshot {
        while let Some(event) = rx.recv().await {
            let is_shutdown = matches!(event, StoreEvent::Shutdown);
            self.dispatch(event);
            if is_shutdown {
                break;
            }
        }
        tracing::debug!("store loop finished");
        self.snapshot()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            auth: self.auth.snapshot(),
            connection: self.connection.clone(),
            process: self.process.clone(),
            sessions: self
                .sessions
                .iter()
                .map(|(id, tracker)| (id.clone(), tracker.snapshot()))
                .collect(),
            shut_down: self.shut_down,
        }
    }

    fn publish(&self) {
        // No receivers is fine; the snapshot is still kept for later subscribers
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
