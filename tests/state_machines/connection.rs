//! Realtime connection machine

use tether::state::{ConnectionEffect, ConnectionEvent, ConnectionMachine, ConnectionState};

use super::sequences;
use crate::common::fast_backoff;

const MAX_RETRIES: u32 = 2;

fn alphabet() -> Vec<ConnectionEvent> {
    vec![
        ConnectionEvent::Connect,
        ConnectionEvent::Opened,
        ConnectionEvent::Dropped {
            reason: "reset".to_string(),
        },
        ConnectionEvent::Rejected {
            reason: "401".to_string(),
        },
        ConnectionEvent::RetryElapsed,
        ConnectionEvent::Close,
    ]
}

#[test]
fn test_connection_invariants_hold_for_every_sequence() {
    let events = alphabet();
    for seq in sequences(events.len(), 6) {
        let mut machine = ConnectionMachine::new(fast_backoff(), MAX_RETRIES);
        for &i in &seq {
            let was_connecting = matches!(machine.state(), ConnectionState::Connecting { .. });
            let was_closed = matches!(machine.state(), ConnectionState::Closed);
            let effect = machine.apply(events[i].clone());

            assert!(machine.retries() <= MAX_RETRIES, "sequence {seq:?}");

            match &effect {
                Some(ConnectionEffect::Open) => assert!(
                    matches!(machine.state(), ConnectionState::Connecting { .. }),
                    "sequence {seq:?}"
                ),
                Some(ConnectionEffect::ScheduleRetry(_)) => assert!(
                    matches!(machine.state(), ConnectionState::Reconnecting { .. }),
                    "sequence {seq:?}"
                ),
                Some(ConnectionEffect::Shutdown) => {
                    assert_eq!(machine.state(), &ConnectionState::Closed)
                }
                None => {}
            }

            if was_connecting && events[i] == ConnectionEvent::Opened {
                assert_eq!(machine.retries(), 0, "sequence {seq:?}");
                assert!(matches!(machine.state(), ConnectionState::Connected { .. }));
            }
            if events[i] == ConnectionEvent::Close {
                assert_eq!(machine.state(), &ConnectionState::Closed);
            }
            if matches!(events[i], ConnectionEvent::Rejected { .. }) && !was_closed {
                assert!(
                    matches!(
                        machine.state(),
                        ConnectionState::Failed { .. } | ConnectionState::Idle
                    ),
                    "sequence {seq:?}"
                );
            }
        }
    }
}

#[test]
fn test_retry_budget_runs_out() {
    let mut machine = ConnectionMachine::new(fast_backoff(), MAX_RETRIES);
    assert_eq!(machine.apply(ConnectionEvent::Connect), Some(ConnectionEffect::Open));

    for attempt in 1..=MAX_RETRIES {
        let effect = machine.apply(ConnectionEvent::Dropped {
            reason: "reset".to_string(),
        });
        assert!(matches!(effect, Some(ConnectionEffect::ScheduleRetry(_))));
        assert_eq!(machine.retries(), attempt);
        assert_eq!(machine.apply(ConnectionEvent::RetryElapsed), Some(ConnectionEffect::Open));
    }

    let effect = machine.apply(ConnectionEvent::Dropped {
        reason: "reset".to_string(),
    });
    assert_eq!(effect, None);
    assert_eq!(
        machine.state(),
        &ConnectionState::Failed {
            reason: "reset".to_string()
        }
    );

    // A manual connect starts over with a full budget
    assert_eq!(machine.apply(ConnectionEvent::Connect), Some(ConnectionEffect::Open));
    assert_eq!(machine.retries(), 0);
}

#[test]
fn test_retry_delays_grow() {
    let mut machine = ConnectionMachine::new(fast_backoff(), 3);
    machine.apply(ConnectionEvent::Connect);

    let mut delays = Vec::new();
    for _ in 0..3 {
        if let Some(ConnectionEffect::ScheduleRetry(delay)) = machine.apply(ConnectionEvent::Dropped {
            reason: "reset".to_string(),
        }) {
            delays.push(delay.as_millis());
        }
        machine.apply(ConnectionEvent::RetryElapsed);
    }
    assert_eq!(delays, vec![10, 20, 40]);
}
