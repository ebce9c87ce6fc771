//! Authentication session machine

use chrono::{Duration, Utc};
use tether::state::{AuthEvent, AuthState, SessionMachine};

use super::sequences;

fn alphabet() -> Vec<AuthEvent> {
    vec![
        AuthEvent::SignInStarted,
        AuthEvent::SignInSucceeded {
            account: "dev".to_string(),
            expires_at: None,
        },
        AuthEvent::SignInFailed {
            message: "denied".to_string(),
        },
        AuthEvent::RefreshStarted,
        AuthEvent::Refreshed { expires_at: None },
        AuthEvent::RefreshFailed {
            message: "offline".to_string(),
        },
        AuthEvent::TokenExpired,
        AuthEvent::SignOut,
    ]
}

#[test]
fn test_authenticated_only_with_an_account() {
    let events = alphabet();
    for seq in sequences(events.len(), 4) {
        let mut machine = SessionMachine::new();
        for &i in &seq {
            machine.apply(events[i].clone());
            let signed_in = matches!(
                machine.state(),
                AuthState::SignedIn { .. } | AuthState::Refreshing { .. }
            );
            assert_eq!(machine.is_authenticated(), signed_in, "sequence {seq:?}");
            assert_eq!(machine.snapshot().authenticated, signed_in);
        }
    }
}

#[test]
fn test_sign_out_always_wins() {
    let events = alphabet();
    for seq in sequences(events.len(), 3) {
        let mut machine = SessionMachine::new();
        for &i in &seq {
            machine.apply(events[i].clone());
        }
        machine.apply(AuthEvent::SignOut);
        assert_eq!(machine.state(), &AuthState::SignedOut, "sequence {seq:?}");
    }
}

#[test]
fn test_refresh_needs_a_signed_in_session() {
    let mut machine = SessionMachine::new();
    assert!(!machine.apply(AuthEvent::RefreshStarted));
    assert!(!machine.apply(AuthEvent::Refreshed { expires_at: None }));
    assert_eq!(machine.state(), &AuthState::SignedOut);
}

#[test]
fn test_deadline_expires_session() {
    let mut machine = SessionMachine::new();
    let deadline = Utc::now() + Duration::minutes(5);
    machine.apply(AuthEvent::SignInSucceeded {
        account: "dev".to_string(),
        expires_at: Some(deadline),
    });

    assert!(!machine.check_expiry(deadline - Duration::seconds(1)));
    assert!(machine.is_authenticated());

    assert!(machine.check_expiry(deadline));
    assert_eq!(
        machine.state(),
        &AuthState::Expired {
            account: "dev".to_string()
        }
    );
}
