//! Supervisor lifecycle as a pure state machine.
//!
//! The supervisor task feeds [`SupervisorEvent`]s in and carries out the
//! returned [`SupervisorEffect`]. Nothing here touches the OS, so every
//! restart decision can be tested without spawning a process.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backoff::Backoff;
use crate::config::{ReadinessProbe, RestartPolicy, SupervisorSettings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    Idle,
    /// Spawned, waiting for the readiness probe
    Starting { pid: u32 },
    Running {
        pid: u32,
        /// Address the agent advertised on stdout, if the probe captured one
        endpoint: Option<String>,
    },
    /// Crashed; respawning when the timer fires
    Backoff { attempt: u32, retry_in_ms: u64 },
    /// SIGTERM sent, waiting for the child to exit
    Stopping { pid: u32 },
    Stopped,
    /// Exited and the restart policy said no
    Exited { code: Option<i32> },
    SpawnFailed { message: String },
    MaxRestartsReached { restarts: u32 },
}

impl ProcessState {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessState::Idle => "idle",
            ProcessState::Starting { .. } => "starting",
            ProcessState::Running { .. } => "running",
            ProcessState::Backoff { .. } => "backoff",
            ProcessState::Stopping { .. } => "stopping",
            ProcessState::Stopped => "stopped",
            ProcessState::Exited { .. } => "exited",
            ProcessState::SpawnFailed { .. } => "spawn_failed",
            ProcessState::MaxRestartsReached { .. } => "max_restarts_reached",
        }
    }

    /// States that only an explicit start leaves
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Stopped
                | ProcessState::Exited { .. }
                | ProcessState::SpawnFailed { .. }
                | ProcessState::MaxRestartsReached { .. }
        )
    }

    /// A child is alive or about to be
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting { .. }
                | ProcessState::Running { .. }
                | ProcessState::Backoff { .. }
                | ProcessState::Stopping { .. }
        )
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Starting { pid }
            | ProcessState::Running { pid, .. }
            | ProcessState::Stopping { pid } => Some(*pid),
            _ => None,
        }
    }

    fn can_start(&self) -> bool {
        matches!(self, ProcessState::Idle) || self.is_terminal()
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the last child ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// `None` when the child was killed by a signal
    pub code: Option<i32>,
    pub generation: u64,
    pub at: DateTime<Utc>,
}

/// Read-only view for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorSnapshot {
    pub state: ProcessState,
    pub restarts: u32,
    pub max_restarts: u32,
    /// Incremented on every spawn
    pub generation: u64,
    pub last_exit: Option<ExitInfo>,
    pub started_at: Option<DateTime<Utc>>,
}

/// The one deadline a supervisor can have pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Restart,
    ReadyTimeout,
    ShutdownGrace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Start,
    Spawned { pid: u32, at: Instant },
    SpawnFailed { message: String },
    Ready {
        generation: u64,
        endpoint: Option<String>,
        at: Instant,
    },
    Exited {
        generation: u64,
        code: Option<i32>,
        at: Instant,
    },
    ReadyTimedOut,
    RestartElapsed,
    GraceElapsed,
    Stop,
    /// Manual restart; not counted against the restart limit
    Restart,
}

/// Work the supervisor task has to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEffect {
    Spawn { generation: u64 },
    Arm { timer: TimerKind, after: Duration },
    /// SIGTERM, then arm the grace timer
    Terminate { pid: u32, grace: Duration },
    Kill { pid: u32 },
}

#[derive(Debug, Clone)]
pub struct SupervisorMachine {
    state: ProcessState,
    policy: RestartPolicy,
    backoff: Backoff,
    ready_timeout: Option<Duration>,
    stable_after: Duration,
    grace: Duration,
    generation: u64,
    last_exit: Option<ExitInfo>,
    started_at: Option<DateTime<Utc>>,
    ready_at: Option<Instant>,
    restart_pending: bool,
}

impl SupervisorMachine {
    pub fn new(settings: &SupervisorSettings) -> Self {
        let ready_timeout = match settings.readiness {
            ReadinessProbe::None => None,
            _ => Some(Duration::from_millis(settings.ready_timeout_ms)),
        };
        Self {
            state: ProcessState::Idle,
            policy: settings.restart_policy,
            backoff: Backoff::new(settings.backoff.clone(), settings.max_restarts),
            ready_timeout,
            stable_after: Duration::from_millis(settings.stable_after_ms),
            grace: Duration::from_millis(settings.shutdown_grace_ms),
            generation: 0,
            last_exit: None,
            started_at: None,
            ready_at: None,
            restart_pending: false,
        }
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    /// Automatic restarts since the last reset
    pub fn restarts(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Which timer the current state may have armed
    pub fn timer_kind(&self) -> Option<TimerKind> {
        match self.state {
            ProcessState::Starting { .. } if self.ready_timeout.is_some() => {
                Some(TimerKind::ReadyTimeout)
            }
            ProcessState::Backoff { .. } => Some(TimerKind::Restart),
            ProcessState::Stopping { .. } => Some(TimerKind::ShutdownGrace),
            _ => None,
        }
    }

    pub fn apply(&mut self, event: SupervisorEvent) -> Option<SupervisorEffect> {
        let (next, effect) = match (self.state.clone(), event) {
            (state, SupervisorEvent::Start) if state.can_start() => {
                self.backoff.reset();
                self.restart_pending = false;
                (None, Some(self.begin_spawn()))
            }

            (_, SupervisorEvent::Spawned { pid, at }) => {
                self.started_at = Some(Utc::now());
                match self.ready_timeout {
                    Some(after) => {
                        self.ready_at = None;
                        (
                            Some(ProcessState::Starting { pid }),
                            Some(SupervisorEffect::Arm {
                                timer: TimerKind::ReadyTimeout,
                                after,
                            }),
                        )
                    }
                    None => {
                        self.ready_at = Some(at);
                        (
                            Some(ProcessState::Running {
                                pid,
                                endpoint: None,
                            }),
                            None,
                        )
                    }
                }
            }

            (_, SupervisorEvent::SpawnFailed { message }) => {
                tracing::error!(error = %message, "agent spawn failed, not retrying");
                self.restart_pending = false;
                (Some(ProcessState::SpawnFailed { message }), None)
            }

            (
                ProcessState::Starting { pid },
                SupervisorEvent::Ready {
                    generation,
                    endpoint,
                    at,
                },
            ) if generation == self.generation => {
                self.ready_at = Some(at);
                (Some(ProcessState::Running { pid, endpoint }), None)
            }

            (
                ProcessState::Starting { .. } | ProcessState::Running { .. },
                SupervisorEvent::Exited {
                    generation,
                    code,
                    at,
                },
            ) if generation == self.generation => {
                self.record_exit(code);
                let (next, effect) = self.classify_crash(code, at);
                (Some(next), effect)
            }

            (ProcessState::Stopping { .. }, SupervisorEvent::Exited { generation, code, .. })
                if generation == self.generation =>
            {
                self.record_exit(code);
                if self.restart_pending {
                    self.restart_pending = false;
                    (Some(ProcessState::Stopped), Some(self.begin_spawn()))
                } else {
                    (Some(ProcessState::Stopped), None)
                }
            }

            (ProcessState::Starting { pid }, SupervisorEvent::ReadyTimedOut) => {
                tracing::warn!(pid, "agent did not become ready in time, killing it");
                (None, Some(SupervisorEffect::Kill { pid }))
            }

            (ProcessState::Backoff { .. }, SupervisorEvent::RestartElapsed) => {
                (None, Some(self.begin_spawn()))
            }

            (ProcessState::Stopping { pid }, SupervisorEvent::GraceElapsed) => {
                tracing::warn!(pid, "agent ignored SIGTERM, killing it");
                (None, Some(SupervisorEffect::Kill { pid }))
            }

            (
                ProcessState::Starting { pid } | ProcessState::Running { pid, .. },
                event @ (SupervisorEvent::Stop | SupervisorEvent::Restart),
            ) => {
                self.restart_pending = event == SupervisorEvent::Restart;
                (
                    Some(ProcessState::Stopping { pid }),
                    Some(SupervisorEffect::Terminate {
                        pid,
                        grace: self.grace,
                    }),
                )
            }

            (
                ProcessState::Stopping { .. },
                event @ (SupervisorEvent::Stop | SupervisorEvent::Restart),
            ) => {
                self.restart_pending = event == SupervisorEvent::Restart;
                (None, None)
            }

            (ProcessState::Backoff { .. }, SupervisorEvent::Stop) => {
                (Some(ProcessState::Stopped), None)
            }

            (ProcessState::Backoff { .. }, SupervisorEvent::Restart) => {
                (None, Some(self.begin_spawn()))
            }

            (state, SupervisorEvent::Restart) if state.can_start() => {
                self.backoff.reset();
                (None, Some(self.begin_spawn()))
            }

            (state, event) => {
                tracing::debug!(state = %state, event = ?event, "ignoring supervisor event");
                (None, None)
            }
        };

        if let Some(next) = next {
            if next != self.state {
                tracing::info!(
                    from = %self.state,
                    to = %next,
                    generation = self.generation,
                    restarts = self.restarts(),
                    "agent state changed"
                );
            }
            self.state = next;
        }
        effect
    }

    fn record_exit(&mut self, code: Option<i32>) {
        self.last_exit = Some(ExitInfo {
            code,
            generation: self.generation,
            at: Utc::now(),
        });
    }

    fn begin_spawn(&mut self) -> SupervisorEffect {
        self.generation += 1;
        SupervisorEffect::Spawn {
            generation: self.generation,
        }
    }

    /// Decide what follows an unexpected exit
    fn classify_crash(
        &mut self,
        code: Option<i32>,
        at: Instant,
    ) -> (ProcessState, Option<SupervisorEffect>) {
        let stable = self
            .ready_at
            .is_some_and(|ready_at| at.saturating_duration_since(ready_at) >= self.stable_after);
        if stable && self.backoff.attempt() > 0 {
            tracing::debug!(restarts = self.backoff.attempt(), "agent was stable, resetting restart counter");
            self.backoff.reset();
        }
        self.ready_at = None;

        if !self.policy.should_restart(code) {
            tracing::info!(code = ?code, policy = ?self.policy, "agent exited, not restarting");
            return (ProcessState::Exited { code }, None);
        }

        match self.backoff.next_delay() {
            Some(delay) => {
                tracing::warn!(
                    code = ?code,
                    attempt = self.backoff.attempt(),
                    max_restarts = self.backoff.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "agent crashed, restarting after backoff"
                );
                (
                    ProcessState::Backoff {
                        attempt: self.backoff.attempt(),
                        retry_in_ms: delay.as_millis() as u64,
                    },
                    Some(SupervisorEffect::Arm {
                        timer: TimerKind::Restart,
                        after: delay,
                    }),
                )
            }
            None => {
                tracing::error!(
                    code = ?code,
                    restarts = self.backoff.attempt(),
                    "agent crashed too many times, giving up"
                );
                (
                    ProcessState::MaxRestartsReached {
                        restarts: self.backoff.attempt(),
                    },
                    None,
                )
            }
        }
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            state: self.state.clone(),
            restarts: self.restarts(),
            max_restarts: self.backoff.max_attempts(),
            generation: self.generation,
            last_exit: self.last_exit.clone(),
            started_at: self.started_at,
        }
    }
}
