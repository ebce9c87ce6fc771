//! Process supervisor for the agent binary.
//!
//! A [`Supervisor`] owns one long-lived child process. It spawns it, waits
//! for it to become ready, restarts it with exponential backoff when it
//! crashes, and shuts it down gracefully (SIGTERM, grace period, SIGKILL).
//!
//! All state lives in a background tokio task; the handle talks to it over a
//! command channel and reads state through a `watch` snapshot.

mod buffer;
mod process;
mod readiness;
pub mod registry;
mod state;

pub use buffer::OutputBuffer;
pub use readiness::Readiness;
pub use state::{
    ExitInfo, ProcessState, SupervisorEffect, SupervisorEvent, SupervisorMachine,
    SupervisorSnapshot, TimerKind,
};

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::SupervisorConfig;
use crate::domain::ProcessOutput;
use crate::error::SupervisorError;
use process::{Command, SupervisorTask};

/// Lines that may queue up for a slow output subscriber before it lags
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Handle to a running supervisor task
pub struct Supervisor {
    commands: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SupervisorSnapshot>,
    output_tx: broadcast::Sender<ProcessOutput>,
    buffer: Arc<Mutex<OutputBuffer>>,
}

impl Supervisor {
    /// Spawn the supervisor task in the `Idle` state.
    /// Must be called from within a tokio runtime.
    pub fn new(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let readiness = Readiness::compile(&config.settings.readiness)?;
        let machine = SupervisorMachine::new(&config.settings);

        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let buffer = Arc::new(Mutex::new(OutputBuffer::new(
            config.settings.output_buffer_lines,
        )));
        let (commands_tx, commands_rx) = mpsc::channel(32);

        let task = SupervisorTask::new(
            config.command,
            readiness,
            machine,
            commands_rx,
            snapshot_tx,
            output_tx.clone(),
            buffer.clone(),
        );
        tokio::spawn(task.run());

        Ok(Self {
            commands: commands_tx,
            snapshot_rx,
            output_tx,
            buffer,
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Spawn the agent. A spawn failure is returned and never retried.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.request(Command::Start).await?
    }

    /// Stop the agent gracefully and wait until it is gone
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.request(Command::Stop).await
    }

    /// Stop and start again; does not count as an automatic restart.
    /// Returns once the new child is spawned, with its spawn error if any.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.request(Command::Restart).await?
    }

    /// Write one line to the agent's stdin
    pub async fn write_stdin(&self, line: impl Into<String>) -> Result<(), SupervisorError> {
        let line = line.into();
        self.request(|tx| Command::WriteStdin(line, tx)).await?
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<SupervisorSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Live stdout/stderr lines from every generation
    pub fn output(&self) -> broadcast::Receiver<ProcessOutput> {
        self.output_tx.subscribe()
    }

    /// The last `n` buffered output lines, oldest first
    pub fn recent_output(&self, n: usize) -> Vec<ProcessOutput> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_n(n)
    }

    /// Stop the agent and end the supervisor task
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        match self.request(Command::Shutdown).await {
            Ok(()) | Err(SupervisorError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
