//! Process supervisor machine, driven the way the supervisor task drives it

use std::time::Instant;

use tether::config::{ReadinessProbe, SupervisorSettings};
use tether::supervisor::{ProcessState, SupervisorEffect, SupervisorEvent, SupervisorMachine};

use super::sequences;
use crate::common::fast_backoff;

const MAX_RESTARTS: u32 = 2;

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Stop,
    Restart,
    Ready,
    Crash,
    ReadyTimedOut,
    RestartElapsed,
    GraceElapsed,
}

const ACTIONS: [Action; 8] = [
    Action::Start,
    Action::Stop,
    Action::Restart,
    Action::Ready,
    Action::Crash,
    Action::ReadyTimedOut,
    Action::RestartElapsed,
    Action::GraceElapsed,
];

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        max_restarts: MAX_RESTARTS,
        backoff: fast_backoff(),
        readiness: ReadinessProbe::Stdout {
            pattern: "ready".to_string(),
        },
        ..SupervisorSettings::default()
    }
}

/// A fake process table: at most one child, identified by its generation
struct Sim {
    machine: SupervisorMachine,
    live: Option<u64>,
    next_pid: u32,
    spawns: u32,
}

impl Sim {
    fn new() -> Self {
        Self {
            machine: SupervisorMachine::new(&settings()),
            live: None,
            next_pid: 100,
            spawns: 0,
        }
    }

    fn feed(&mut self, event: SupervisorEvent) {
        let mut effect = self.machine.apply(event);
        while let Some(SupervisorEffect::Spawn { generation }) = effect {
            assert!(self.live.is_none(), "spawned while a child is still alive");
            assert_eq!(generation, self.machine.generation());
            self.live = Some(generation);
            self.next_pid += 1;
            self.spawns += 1;
            effect = self.machine.apply(SupervisorEvent::Spawned {
                pid: self.next_pid,
                at: Instant::now(),
            });
        }
    }

    fn exit(&mut self, code: Option<i32>) {
        if let Some(generation) = self.live.take() {
            self.feed(SupervisorEvent::Exited {
                generation,
                code,
                at: Instant::now(),
            });
        }
    }

    fn act(&mut self, action: Action) {
        match action {
            Action::Start => self.feed(SupervisorEvent::Start),
            Action::Stop => self.feed(SupervisorEvent::Stop),
            Action::Restart => self.feed(SupervisorEvent::Restart),
            Action::Ready => {
                if let Some(generation) = self.live {
                    self.feed(SupervisorEvent::Ready {
                        generation,
                        endpoint: None,
                        at: Instant::now(),
                    });
                }
            }
            Action::Crash => self.exit(Some(1)),
            Action::ReadyTimedOut => self.feed(SupervisorEvent::ReadyTimedOut),
            Action::RestartElapsed => self.feed(SupervisorEvent::RestartElapsed),
            Action::GraceElapsed => self.feed(SupervisorEvent::GraceElapsed),
        }
        // Terminate and Kill are delivered by the OS as an exit
        if matches!(self.machine.state(), ProcessState::Stopping { .. })
            && matches!(action, Action::GraceElapsed)
        {
            self.exit(None);
        }
    }
}

#[test]
fn test_supervisor_invariants_hold_for_every_sequence() {
    for seq in sequences(ACTIONS.len(), 5) {
        let mut sim = Sim::new();
        let mut last_generation = 0;
        for &i in &seq {
            sim.act(ACTIONS[i]);
            let machine = &sim.machine;

            assert!(machine.restarts() <= MAX_RESTARTS, "sequence {seq:?}");
            assert!(machine.generation() >= last_generation, "sequence {seq:?}");
            last_generation = machine.generation();

            match machine.state() {
                ProcessState::Starting { .. }
                | ProcessState::Running { .. }
                | ProcessState::Stopping { .. } => {
                    assert!(sim.live.is_some(), "{} without a child: {seq:?}", machine.state())
                }
                ProcessState::Idle
                | ProcessState::Backoff { .. }
                | ProcessState::Stopped
                | ProcessState::Exited { .. }
                | ProcessState::SpawnFailed { .. }
                | ProcessState::MaxRestartsReached { .. } => {
                    assert!(sim.live.is_none(), "{} with a child: {seq:?}", machine.state())
                }
            }
            if let ProcessState::MaxRestartsReached { restarts } = machine.state() {
                assert_eq!(*restarts, MAX_RESTARTS);
            }
        }
    }
}

#[test]
fn test_spawn_failure_is_never_retried() {
    let passive = [
        Action::Stop,
        Action::Ready,
        Action::Crash,
        Action::ReadyTimedOut,
        Action::RestartElapsed,
        Action::GraceElapsed,
    ];
    for seq in sequences(passive.len(), 4) {
        let mut machine = SupervisorMachine::new(&settings());
        assert_eq!(
            machine.apply(SupervisorEvent::Start),
            Some(SupervisorEffect::Spawn { generation: 1 })
        );
        machine.apply(SupervisorEvent::SpawnFailed {
            message: "No such file or directory".to_string(),
        });

        for &i in &seq {
            let event = match passive[i] {
                Action::Stop => SupervisorEvent::Stop,
                Action::Ready => SupervisorEvent::Ready {
                    generation: 1,
                    endpoint: None,
                    at: Instant::now(),
                },
                Action::Crash => SupervisorEvent::Exited {
                    generation: 1,
                    code: Some(1),
                    at: Instant::now(),
                },
                Action::ReadyTimedOut => SupervisorEvent::ReadyTimedOut,
                Action::RestartElapsed => SupervisorEvent::RestartElapsed,
                _ => SupervisorEvent::GraceElapsed,
            };
            let effect = machine.apply(event);
            assert!(
                !matches!(effect, Some(SupervisorEffect::Spawn { .. })),
                "sequence {seq:?}"
            );
        }
        assert!(
            matches!(machine.state(), ProcessState::SpawnFailed { .. }),
            "sequence {seq:?}"
        );
        assert_eq!(machine.generation(), 1);
    }
}

#[test]
fn test_crash_loop_backs_off_then_gives_up() {
    let mut sim = Sim::new();
    sim.act(Action::Start);
    sim.act(Action::Ready);

    let mut delays = Vec::new();
    for _ in 0..MAX_RESTARTS {
        sim.act(Action::Crash);
        match sim.machine.state() {
            ProcessState::Backoff { retry_in_ms, .. } => delays.push(*retry_in_ms),
            other => panic!("expected backoff, got {other}"),
        }
        sim.act(Action::RestartElapsed);
        sim.act(Action::Ready);
    }
    sim.act(Action::Crash);

    assert_eq!(delays, vec![10, 20]);
    assert_eq!(
        sim.machine.state(),
        &ProcessState::MaxRestartsReached {
            restarts: MAX_RESTARTS
        }
    );
    assert_eq!(sim.spawns, MAX_RESTARTS + 1);
}

#[test]
fn test_stale_generation_events_are_ignored() {
    let mut sim = Sim::new();
    sim.act(Action::Start);
    sim.act(Action::Restart);
    sim.act(Action::GraceElapsed);
    assert_eq!(sim.machine.generation(), 2);

    let before = sim.machine.snapshot();
    sim.machine.apply(SupervisorEvent::Exited {
        generation: 1,
        code: Some(0),
        at: Instant::now(),
    });
    sim.machine.apply(SupervisorEvent::Ready {
        generation: 1,
        endpoint: Some("http://stale".to_string()),
        at: Instant::now(),
    });
    assert_eq!(sim.machine.snapshot(), before);
}

#[test]
fn test_timer_matches_state() {
    let mut sim = Sim::new();
    sim.act(Action::Start);
    assert!(sim.machine.timer_kind().is_some());
    sim.act(Action::Ready);
    assert_eq!(sim.machine.timer_kind(), None);
    sim.act(Action::Crash);
    assert!(matches!(sim.machine.state(), ProcessState::Backoff { .. }));
    assert!(sim.machine.timer_kind().is_some());
}
