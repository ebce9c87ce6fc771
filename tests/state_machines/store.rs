//! Store dispatch across all machines

use tether::config::SyncConfig;
use tether::state::{AuthEvent, AuthState, ConnectionSnapshot, ConnectionState, TurnPhase};
use tether::store::{AgentStore, StoreEvent};
use tether::supervisor::{ProcessState, SupervisorSnapshot};

use super::sequences;
use crate::common::{complete, tool_use, user};

fn process(state: ProcessState) -> SupervisorSnapshot {
    SupervisorSnapshot {
        state,
        restarts: 0,
        max_restarts: 5,
        generation: 1,
        last_exit: None,
        started_at: None,
    }
}

fn alphabet() -> Vec<StoreEvent> {
    vec![
        StoreEvent::Agent(user("a", "u1", "hi")),
        StoreEvent::Agent(user("b", "u2", "hello")),
        StoreEvent::Agent(tool_use("a", "t1", "Bash")),
        StoreEvent::Agent(complete("a")),
        StoreEvent::Auth(AuthEvent::SignInSucceeded {
            account: "dev".to_string(),
            expires_at: None,
        }),
        StoreEvent::Auth(AuthEvent::TokenExpired),
        StoreEvent::Connection(ConnectionSnapshot {
            state: ConnectionState::Closed,
            retries: 0,
            max_retries: 3,
            last_error: None,
        }),
        StoreEvent::Process(process(ProcessState::Running {
            pid: 7,
            endpoint: None,
        })),
    ]
}

#[test]
fn test_shutdown_ends_every_session_after_any_history() {
    let events = alphabet();
    for seq in sequences(events.len(), 4) {
        let mut store = AgentStore::new(SyncConfig::default());
        for &i in &seq {
            store.dispatch(events[i].clone());
        }
        let sessions_before = store.snapshot().sessions.len();

        store.dispatch(StoreEvent::Shutdown);
        store.dispatch(StoreEvent::Agent(user("late", "u9", "anyone there?")));

        let snap = store.snapshot();
        assert!(snap.shut_down);
        assert_eq!(snap.auth.state, AuthState::SignedOut, "sequence {seq:?}");
        assert!(!snap.auth.authenticated);
        assert_eq!(snap.sessions.len(), sessions_before, "sequence {seq:?}");
        for (id, session) in &snap.sessions {
            assert_eq!(session.phase, TurnPhase::Shutdown, "session {id} after {seq:?}");
        }
    }
}

#[test]
fn test_sessions_are_independent() {
    let mut store = AgentStore::new(SyncConfig::default());
    store.dispatch(StoreEvent::Agent(user("a", "u1", "run tests")));
    store.dispatch(StoreEvent::Agent(tool_use("a", "t1", "Bash")));
    store.dispatch(StoreEvent::Agent(user("b", "u2", "explain")));
    store.dispatch(StoreEvent::Agent(complete("b")));

    let snap = store.snapshot();
    assert_eq!(snap.sessions["a"].phase, TurnPhase::ToolExecution);
    assert_eq!(snap.sessions["b"].phase, TurnPhase::Waiting);
    assert_eq!(snap.sessions["b"].turns, 1);
    assert_eq!(snap.sessions["a"].turns, 0);
}

#[test]
fn test_process_snapshot_is_mirrored() {
    let mut store = AgentStore::new(SyncConfig::default());
    assert!(store.snapshot().process.is_none());

    store.dispatch(StoreEvent::Process(process(ProcessState::Stopped)));
    let snap = store.snapshot();
    assert_eq!(snap.process.map(|p| p.state), Some(ProcessState::Stopped));
}

#[test]
fn test_snapshot_serializes() {
    let mut store = AgentStore::new(SyncConfig::default());
    store.dispatch(StoreEvent::Agent(user("a", "u1", "hi")));

    let json = serde_json::to_value(store.snapshot()).unwrap();
    assert_eq!(json["sessions"]["a"]["phase"], "calling_model");
    assert_eq!(json["auth"]["state"]["state"], "signed_out");
}
