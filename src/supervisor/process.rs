//! The supervisor task: sole owner of the state machine, the child process
//! and the single pending timer.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as ProcessCommand};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::buffer::OutputBuffer;
use super::readiness::{self, Readiness};
use super::registry;
use super::state::{
    ProcessState, SupervisorEffect, SupervisorEvent, SupervisorMachine, SupervisorSnapshot,
    TimerKind,
};
use crate::config::AgentCommand;
use crate::domain::{OutputStream, ProcessOutput};
use crate::error::SupervisorError;

/// Requests from the [`super::Supervisor`] handle
pub(super) enum Command {
    Start(oneshot::Sender<Result<(), SupervisorError>>),
    Stop(oneshot::Sender<()>),
    Restart(oneshot::Sender<Result<(), SupervisorError>>),
    WriteStdin(String, oneshot::Sender<Result<(), SupervisorError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Reports from the helper tasks of one child
#[derive(Debug)]
pub(crate) enum Internal {
    Ready {
        generation: u64,
        endpoint: Option<String>,
    },
    Exited {
        generation: u64,
        code: Option<i32>,
    },
}

struct LiveChild {
    generation: u64,
    stdin: Option<ChildStdin>,
    /// Tells the waiter task to kill the child
    kill: Option<oneshot::Sender<()>>,
    /// Dropping this stops the HTTP readiness probe
    _probe_cancel: Option<oneshot::Sender<()>>,
}

pub(super) struct SupervisorTask {
    command: AgentCommand,
    readiness: Readiness,
    machine: SupervisorMachine,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    snapshot_tx: watch::Sender<SupervisorSnapshot>,
    output_tx: broadcast::Sender<ProcessOutput>,
    buffer: Arc<Mutex<OutputBuffer>>,
    timer: Option<(tokio::time::Instant, TimerKind)>,
    child: Option<LiveChild>,
    spawn_error: Option<SupervisorError>,
    stop_waiters: Vec<oneshot::Sender<()>>,
    /// Restarts waiting for the old child to exit and the new one to spawn
    restart_waiters: Vec<oneshot::Sender<Result<(), SupervisorError>>>,
    exiting: bool,
}

impl SupervisorTask {
    pub(super) fn new(
        command: AgentCommand,
        readiness: Readiness,
        machine: SupervisorMachine,
        commands: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<SupervisorSnapshot>,
        output_tx: broadcast::Sender<ProcessOutput>,
        buffer: Arc<Mutex<OutputBuffer>>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            command,
            readiness,
            machine,
            commands,
            internal_tx,
            internal_rx,
            snapshot_tx,
            output_tx,
            buffer,
            timer: None,
            child: None,
            spawn_error: None,
            stop_waiters: Vec::new(),
            restart_waiters: Vec::new(),
            exiting: false,
        }
    }

    pub(super) async fn run(mut self) {
        let mut commands_open = true;

        loop {
            let armed = self.timer.is_some();
            let deadline = self
                .timer
                .map(|(at, _)| at)
                .unwrap_or_else(tokio::time::Instant::now);

            tokio::select! {
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        tracing::debug!("supervisor handle dropped, stopping agent");
                        commands_open = false;
                        self.exiting = true;
                        self.drive(SupervisorEvent::Stop);
                    }
                },
                Some(msg) = self.internal_rx.recv() => self.handle_internal(msg),
                _ = tokio::time::sleep_until(deadline), if armed => self.fire_timer(),
            }

            let active = self.machine.state().is_active();
            if !active {
                for waiter in self.stop_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            let stopping = matches!(self.machine.state(), ProcessState::Stopping { .. });
            if !stopping && !self.restart_waiters.is_empty() {
                self.answer_restarts();
            }
            if self.exiting && !active {
                break;
            }
        }

        tracing::debug!(state = %self.machine.state(), "supervisor task finished");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start(reply) => {
                self.spawn_error = None;
                self.drive(SupervisorEvent::Start);
                let _ = reply.send(self.take_spawn_result());
            }
            Command::Stop(reply) => {
                self.drive(SupervisorEvent::Stop);
                self.stop_waiters.push(reply);
            }
            Command::Restart(reply) => {
                self.spawn_error = None;
                self.drive(SupervisorEvent::Restart);
                if matches!(self.machine.state(), ProcessState::Stopping { .. }) {
                    // The new child is spawned once the old one has exited
                    self.restart_waiters.push(reply);
                } else {
                    let _ = reply.send(self.take_spawn_result());
                }
            }
            Command::WriteStdin(line, reply) => {
                let result = self.write_stdin(line).await;
                let _ = reply.send(result);
            }
            Command::Shutdown(reply) => {
                tracing::info!("supervisor shutting down");
                self.exiting = true;
                self.drive(SupervisorEvent::Stop);
                self.stop_waiters.push(reply);
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Ready {
                generation,
                endpoint,
            } => self.drive(SupervisorEvent::Ready {
                generation,
                endpoint,
                at: Instant::now(),
            }),
            Internal::Exited { generation, code } => {
                if self
                    .child
                    .as_ref()
                    .is_some_and(|c| c.generation == generation)
                {
                    self.child = None;
                }
                self.drive(SupervisorEvent::Exited {
                    generation,
                    code,
                    at: Instant::now(),
                });
            }
        }
    }

    fn fire_timer(&mut self) {
        let Some((_, kind)) = self.timer.take() else {
            return;
        };
        let event = match kind {
            TimerKind::Restart => SupervisorEvent::RestartElapsed,
            TimerKind::ReadyTimeout => SupervisorEvent::ReadyTimedOut,
            TimerKind::ShutdownGrace => SupervisorEvent::GraceElapsed,
        };
        self.drive(event);
    }

    /// Apply an event and every follow-up event its effects produce
    fn drive(&mut self, event: SupervisorEvent) {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            next = self
                .machine
                .apply(event)
                .and_then(|effect| self.execute(effect));
        }

        if self
            .timer
            .is_some_and(|(_, kind)| Some(kind) != self.machine.timer_kind())
        {
            self.timer = None;
        }

        let snapshot = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }

    fn execute(&mut self, effect: SupervisorEffect) -> Option<SupervisorEvent> {
        match effect {
            SupervisorEffect::Spawn { generation } => Some(self.spawn_child(generation)),
            SupervisorEffect::Arm { timer, after } => {
                self.timer = Some((tokio::time::Instant::now() + after, timer));
                None
            }
            SupervisorEffect::Terminate { pid, grace } => {
                tracing::info!(pid, grace_ms = grace.as_millis() as u64, "stopping agent");
                if !registry::terminate(pid) {
                    self.kill_child();
                }
                self.timer = Some((tokio::time::Instant::now() + grace, TimerKind::ShutdownGrace));
                None
            }
            SupervisorEffect::Kill { pid } => {
                tracing::warn!(pid, "killing agent");
                self.kill_child();
                None
            }
        }
    }

    fn kill_child(&mut self) {
        if let Some(kill) = self.child.as_mut().and_then(|c| c.kill.take()) {
            let _ = kill.send(());
        }
    }

    fn answer_restarts(&mut self) {
        let result = self.take_spawn_result();
        for waiter in self.restart_waiters.drain(..) {
            let reply = match &result {
                Ok(()) => Ok(()),
                Err(SupervisorError::Spawn { program, source }) => Err(SupervisorError::Spawn {
                    program: program.clone(),
                    source: std::io::Error::new(source.kind(), source.to_string()),
                }),
                Err(_) => Err(SupervisorError::NotRunning),
            };
            let _ = waiter.send(reply);
        }
    }

    fn take_spawn_result(&mut self) -> Result<(), SupervisorError> {
        match self.spawn_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_child(&mut self, generation: u64) -> SupervisorEvent {
        let agent = &self.command;
        let mut cmd = ProcessCommand::new(&agent.program);
        cmd.args(&agent.args)
            .envs(&agent.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &agent.cwd {
            cmd.current_dir(cwd);
        }

        tracing::info!(command = %agent.display(), generation, "spawning agent");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let message = source.to_string();
                self.spawn_error = Some(SupervisorError::Spawn {
                    program: agent.program.clone(),
                    source,
                });
                return SupervisorEvent::SpawnFailed { message };
            }
        };

        let pid = child.id().unwrap_or(0);
        registry::register(pid, agent.program.clone());

        let stdin = child.stdin.take();
        let ready_pattern = self
            .readiness
            .stdout_pattern()
            .map(|re| (re.clone(), self.internal_tx.clone()));
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(
                stdout,
                OutputStream::Stdout,
                generation,
                self.output_tx.clone(),
                self.buffer.clone(),
                ready_pattern,
            );
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(
                stderr,
                OutputStream::Stderr,
                generation,
                self.output_tx.clone(),
                self.buffer.clone(),
                None,
            );
        }

        let probe_cancel = match &self.readiness {
            Readiness::Http { url, interval } => {
                let (tx, rx) = oneshot::channel();
                readiness::spawn_http_probe(
                    url.clone(),
                    *interval,
                    generation,
                    self.internal_tx.clone(),
                    rx,
                );
                Some(tx)
            }
            _ => None,
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        spawn_waiter(child, pid, generation, kill_rx, self.internal_tx.clone());

        self.child = Some(LiveChild {
            generation,
            stdin,
            kill: Some(kill_tx),
            _probe_cancel: probe_cancel,
        });

        SupervisorEvent::Spawned {
            pid,
            at: Instant::now(),
        }
    }

    async fn write_stdin(&mut self, line: String) -> Result<(), SupervisorError> {
        if !matches!(
            self.machine.state(),
            ProcessState::Starting { .. } | ProcessState::Running { .. }
        ) {
            return Err(SupervisorError::NotRunning);
        }
        let Some(stdin) = self.child.as_mut().and_then(|c| c.stdin.as_mut()) else {
            return Err(SupervisorError::NotRunning);
        };

        stdin.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            stdin.write_all(b"\n").await?;
        }
        stdin.flush().await?;
        Ok(())
    }
}

/// Forward one stdio pipe line by line into the buffer and the broadcast
fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    generation: u64,
    output_tx: broadcast::Sender<ProcessOutput>,
    buffer: Arc<Mutex<OutputBuffer>>,
    mut ready: Option<(Regex, mpsc::UnboundedSender<Internal>)>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(generation, stream = %stream, error = %e, "stopped reading agent output");
                    break;
                }
            };

            let matched = ready
                .as_ref()
                .and_then(|(pattern, _)| readiness::match_line(pattern, &line));
            if let Some(endpoint) = matched {
                if let Some((_, internal)) = ready.take() {
                    let _ = internal.send(Internal::Ready {
                        generation,
                        endpoint,
                    });
                }
            }

            tracing::trace!(generation, stream = %stream, "{}", line);
            let output = ProcessOutput::new(stream, generation, line);
            buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(output.clone());
            // No subscribers is fine
            let _ = output_tx.send(output);
        }
    });
}

/// Own the child until it exits, then report its exit code
fn spawn_waiter(
    mut child: Child,
    pid: u32,
    generation: u64,
    mut kill: oneshot::Receiver<()>,
    internal: mpsc::UnboundedSender<Internal>,
) {
    tokio::spawn(async move {
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = &mut kill => None,
        };
        let status = match exited {
            Some(status) => status,
            None => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!(pid, error = %e, "kill failed, child already gone");
                }
                child.wait().await
            }
        };
        registry::unregister(pid);

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(pid, error = %e, "failed to collect agent exit status");
                None
            }
        };
        tracing::debug!(pid, generation, code = ?code, "agent process exited");
        let _ = internal.send(Internal::Exited { generation, code });
    });
}
