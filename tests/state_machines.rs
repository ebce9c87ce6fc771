//! Property tests for the state machines
//!
//! Each machine is driven through every event sequence up to a small length
//! and checked against the rules it must never break.

mod common;

#[path = "state_machines/connection.rs"]
mod connection;
#[path = "state_machines/session.rs"]
mod session;
#[path = "state_machines/store.rs"]
mod store;
#[path = "state_machines/supervisor.rs"]
mod supervisor;
#[path = "state_machines/turn.rs"]
mod turn;

/// Every sequence of indices into an alphabet of `symbols`, lengths 1..=max_len
pub fn sequences(symbols: usize, max_len: usize) -> Vec<Vec<usize>> {
    let mut all = Vec::new();
    let mut layer: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in 0..max_len {
        let mut next = Vec::with_capacity(layer.len() * symbols);
        for prefix in &layer {
            for symbol in 0..symbols {
                let mut seq = prefix.clone();
                seq.push(symbol);
                next.push(seq);
            }
        }
        all.extend(next.iter().cloned());
        layer = next;
    }
    all
}

#[test]
fn test_sequences_cover_every_length() {
    let all = sequences(3, 2);
    assert_eq!(all.len(), 3 + 9);
    assert!(all.contains(&vec![2, 0]));
}
