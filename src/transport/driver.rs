//! Runs a [`ConnectionMachine`] against a [`Transport`].

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{EventFeed, Transport};
use crate::config::ConnectionConfig;
use crate::error::{StreamError, TransportError};
use crate::state::{AuthEvent, ConnectionEffect, ConnectionEvent, ConnectionMachine, ConnectionSnapshot};
use crate::store::StoreEvent;

#[derive(Debug, Clone, Copy)]
enum DriverCommand {
    Reconnect,
    Close,
}

/// Handle to a running connection driver
pub struct ConnectionHandle {
    commands: mpsc::Sender<DriverCommand>,
    snapshot_rx: watch::Receiver<ConnectionSnapshot>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Connect again after a failure, or retry at once while backing off
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        self.commands
            .send(DriverCommand::Reconnect)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Close the connection and wait for the driver to finish
    pub async fn close(self) {
        let _ = self.commands.send(DriverCommand::Close).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "connection driver task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct ConnectionDriver {
    transport: Arc<dyn Transport>,
    machine: ConnectionMachine,
    commands: mpsc::Receiver<DriverCommand>,
    sink: mpsc::Sender<StoreEvent>,
    snapshot_tx: watch::Sender<ConnectionSnapshot>,
}

enum Pumped {
    Effect(Option<ConnectionEffect>),
    Continue,
}

impl ConnectionDriver {
    /// Start connecting right away. Decoded events go to `sink`.
    pub fn spawn(
        transport: impl Transport + 'static,
        config: &ConnectionConfig,
        sink: mpsc::Sender<StoreEvent>,
    ) -> ConnectionHandle {
        let machine = ConnectionMachine::new(config.backoff.clone(), config.max_retries);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let (commands_tx, commands_rx) = mpsc::channel(8);

        let driver = Self {
            transport: Arc::new(transport),
            machine,
            commands: commands_rx,
            sink,
            snapshot_tx,
        };
        let task = tokio::spawn(driver.run());

        ConnectionHandle {
            commands: commands_tx,
            snapshot_rx,
            task,
        }
    }

    async fn run(mut self) {
        tracing::info!(feed = %self.transport.describe(), "connecting to event feed");
        let mut effect = self.apply(ConnectionEvent::Connect).await;

        loop {
            effect = match effect {
                Some(ConnectionEffect::Open) => self.open_and_pump().await,
                Some(ConnectionEffect::ScheduleRetry(delay)) => self.wait_retry(delay).await,
                Some(ConnectionEffect::Shutdown) => break,
                // Failed: only a command moves us on
                None => match self.commands.recv().await {
                    Some(DriverCommand::Reconnect) => self.apply(ConnectionEvent::Connect).await,
                    Some(DriverCommand::Close) | None => self.apply(ConnectionEvent::Close).await,
                },
            };
        }

        tracing::debug!("connection driver finished");
    }

    async fn apply(&mut self, event: ConnectionEvent) -> Option<ConnectionEffect> {
        let effect = self.machine.apply(event);
        let snapshot = self.machine.snapshot();

        let changed = self.snapshot_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot.clone();
                true
            } else {
                false
            }
        });
        if changed {
            // The store may already be gone during shutdown
            let _ = self.sink.send(StoreEvent::Connection(snapshot)).await;
        }
        effect
    }

    async fn wait_retry(&mut self, delay: Duration) -> Option<ConnectionEffect> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.apply(ConnectionEvent::RetryElapsed).await,
            cmd = self.commands.recv() => match cmd {
                Some(DriverCommand::Reconnect) => {
                    tracing::debug!("reconnect requested, skipping backoff");
                    self.apply(ConnectionEvent::RetryElapsed).await
                }
                Some(DriverCommand::Close) | None => self.apply(ConnectionEvent::Close).await,
            },
        }
    }

    async fn open_and_pump(&mut self) -> Option<ConnectionEffect> {
        let transport = self.transport.clone();
        let open = transport.open();
        tokio::pin!(open);

        let opened = loop {
            tokio::select! {
                result = &mut open => break result,
                cmd = self.commands.recv() => match cmd {
                    Some(DriverCommand::Reconnect) => {}
                    Some(DriverCommand::Close) | None => {
                        return self.apply(ConnectionEvent::Close).await;
                    }
                },
            }
        };

        let mut feed = match opened {
            Ok(feed) => feed,
            Err(TransportError::Unauthorized) => {
                tracing::warn!("event feed rejected our credentials");
                let _ = self.sink.send(StoreEvent::Auth(AuthEvent::TokenExpired)).await;
                return self
                    .apply(ConnectionEvent::Rejected {
                        reason: TransportError::Unauthorized.to_string(),
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open event feed");
                return self
                    .apply(ConnectionEvent::Dropped {
                        reason: e.to_string(),
                    })
                    .await;
            }
        };

        self.apply(ConnectionEvent::Opened).await;

        loop {
            match self.pump_once(&mut feed).await {
                Pumped::Effect(effect) => return effect,
                Pumped::Continue => {}
            }
        }
    }

    async fn pump_once(&mut self, feed: &mut EventFeed) -> Pumped {
        tokio::select! {
            item = feed.next() => match item {
                Some(Ok(envelope)) => {
                    if self.sink.send(StoreEvent::Agent(envelope)).await.is_err() {
                        tracing::debug!("store is gone, closing event feed");
                        return Pumped::Effect(self.apply(ConnectionEvent::Close).await);
                    }
                    Pumped::Continue
                }
                Some(Err(StreamError::Decode { message, record })) => {
                    tracing::warn!(error = %message, record = %record, "skipping malformed event");
                    Pumped::Continue
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "event feed read failed");
                    Pumped::Effect(
                        self.apply(ConnectionEvent::Dropped {
                            reason: e.to_string(),
                        })
                        .await,
                    )
                }
                None => Pumped::Effect(
                    self.apply(ConnectionEvent::Dropped {
                        reason: "feed ended".to_string(),
                    })
                    .await,
                ),
            },
            cmd = self.commands.recv() => match cmd {
                Some(DriverCommand::Reconnect) => {
                    tracing::debug!("already connected, ignoring reconnect");
                    Pumped::Continue
                }
                Some(DriverCommand::Close) | None => {
                    Pumped::Effect(self.apply(ConnectionEvent::Close).await)
                }
            },
        }
    }
}
