//! Conversation turn tracker

use tether::AgentEnvelope;
use tether::AgentEvent;
use tether::config::SyncConfig;
use tether::state::{Role, ToolStatus, TurnPhase, TurnSnapshot, TurnTracker};

use super::sequences;
use crate::common::{complete, text, tool_result, tool_use, user};

const SESSION: &str = "s1";

fn event(session: &str, event: AgentEvent) -> AgentEnvelope {
    AgentEnvelope::new(session, event)
}

fn alphabet() -> Vec<AgentEnvelope> {
    vec![
        user(SESSION, "u1", "fix the build"),
        event(SESSION, AgentEvent::ModelStart { model: None }),
        text(SESSION, "m1", "Look", true),
        text(SESSION, "m1", "Looking at it", false),
        text(SESSION, "m2", "Done", true),
        tool_use(SESSION, "a", "Bash"),
        tool_use(SESSION, "b", "Read"),
        tool_result(SESSION, "a", true),
        tool_result(SESSION, "b", false),
        event(
            SESSION,
            AgentEvent::ToolApprovalNeeded {
                request_id: "r1".to_string(),
                tool_name: "Bash".to_string(),
                tool_input: serde_json::json!({"command": "make"}),
            },
        ),
        event(
            SESSION,
            AgentEvent::HookStart {
                hook_name: "pre".to_string(),
                tool_use_id: None,
            },
        ),
        event(
            SESSION,
            AgentEvent::HookEnd {
                hook_name: "pre".to_string(),
                success: true,
            },
        ),
        complete(SESSION),
        event(
            SESSION,
            AgentEvent::Error {
                message: "rate limited".to_string(),
                code: None,
            },
        ),
        event(SESSION, AgentEvent::Shutdown { reason: None }),
        event(SESSION, AgentEvent::Heartbeat),
    ]
}

fn running(snap: &TurnSnapshot) -> bool {
    snap.tools.iter().any(|t| t.status == ToolStatus::Running)
}

#[test]
fn test_turn_invariants_hold_for_every_sequence() {
    let events = alphabet();
    for seq in sequences(events.len(), 4) {
        let mut tracker = TurnTracker::new(SESSION, &SyncConfig::default());
        let mut before = tracker.snapshot();
        let mut completed = 0;

        for &i in &seq {
            let envelope = events[i].clone();
            let closes_turn = matches!(
                envelope.event,
                AgentEvent::SessionComplete { .. } | AgentEvent::Error { .. }
            );
            if !tracker.is_shutdown() && matches!(envelope.event, AgentEvent::SessionComplete { .. }) {
                completed += 1;
            }
            tracker.push(envelope);
            let after = tracker.snapshot();

            assert!(after.messages.len() >= before.messages.len(), "sequence {seq:?}");
            assert!(after.tools.len() >= before.tools.len(), "sequence {seq:?}");
            assert_eq!(after.turns, completed, "sequence {seq:?}");

            if before.phase == TurnPhase::Shutdown {
                assert_eq!(after, before, "shut down session changed: {seq:?}");
            }
            if after.phase == TurnPhase::ToolExecution {
                assert!(running(&after), "tool phase without a running tool: {seq:?}");
            }
            if after.phase == TurnPhase::Waiting || after.phase == TurnPhase::Shutdown {
                assert!(!running(&after), "idle with a running tool: {seq:?}");
            }
            if closes_turn && before.phase != TurnPhase::Shutdown {
                assert_eq!(after.phase, TurnPhase::Waiting);
                assert!(after.pending_approval.is_none(), "sequence {seq:?}");
            }

            // Only the newest message may still be streaming
            let open = after.messages.iter().filter(|m| !m.complete).count();
            assert!(open <= 1, "sequence {seq:?}");
            if let Some(last) = after.messages.last() {
                if !last.complete {
                    assert_eq!(last.role, Role::Assistant);
                }
            }

            before = after;
        }
    }
}

fn numbered_turn() -> Vec<AgentEnvelope> {
    vec![
        user(SESSION, "u1", "list files").with_seq(1),
        text(SESSION, "m1", "Let me ", true).with_seq(2),
        text(SESSION, "m1", "check.", true).with_seq(3),
        tool_use(SESSION, "t1", "Bash").with_seq(4),
        tool_result(SESSION, "t1", true).with_seq(5),
        complete(SESSION).with_seq(6),
    ]
}

/// Heap's algorithm
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn go<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        go(k - 1, items, out);
        for i in 0..k - 1 {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            go(k - 1, items, out);
        }
    }
    let mut items = items.to_vec();
    let mut out = Vec::new();
    let k = items.len();
    go(k, &mut items, &mut out);
    out
}

#[test]
fn test_any_delivery_order_gives_the_same_turn() {
    let turn = numbered_turn();
    let mut in_order = TurnTracker::new(SESSION, &SyncConfig::default());
    for envelope in turn.clone() {
        in_order.push(envelope);
    }
    let expected = in_order.snapshot();
    assert_eq!(expected.phase, TurnPhase::Waiting);
    assert_eq!(expected.messages[1].text, "Let me check.");
    assert_eq!(expected.tools[0].status, ToolStatus::Completed);
    assert_eq!(expected.turns, 1);

    let orders = permutations(&turn);
    assert_eq!(orders.len(), 720);
    for order in orders {
        let mut tracker = TurnTracker::new(SESSION, &SyncConfig::default());
        for envelope in order {
            tracker.push(envelope);
        }
        assert_eq!(tracker.snapshot(), expected);
    }
}

#[test]
fn test_replayed_feed_is_idempotent() {
    let turn = numbered_turn();
    let mut tracker = TurnTracker::new(SESSION, &SyncConfig::default());
    for envelope in turn.clone() {
        tracker.push(envelope);
    }
    let first = tracker.snapshot();

    for envelope in turn {
        assert_eq!(tracker.push(envelope), 0);
    }
    let replayed = tracker.snapshot();

    assert_eq!(replayed.duplicate_events, 6);
    assert_eq!(replayed.messages, first.messages);
    assert_eq!(replayed.tools, first.tools);
    assert_eq!(replayed.turns, first.turns);
}

#[test]
fn test_gap_is_skipped_when_buffer_overflows() {
    let sync = SyncConfig {
        first_seq: 1,
        max_pending_events: 2,
    };
    let mut tracker = TurnTracker::new(SESSION, &sync);

    // seq 1 never arrives
    assert_eq!(tracker.push(user(SESSION, "u1", "hi").with_seq(2)), 0);
    assert_eq!(tracker.push(text(SESSION, "m1", "hello", false).with_seq(3)), 0);
    assert_eq!(tracker.push(complete(SESSION).with_seq(4)), 3);

    let snap = tracker.snapshot();
    assert_eq!(snap.skipped_events, 1);
    assert_eq!(snap.turns, 1);
    assert_eq!(snap.messages.len(), 2);
}
