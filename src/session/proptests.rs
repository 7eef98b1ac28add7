//! Property-based tests for the session lifecycle

use super::state::*;
use crate::turn::TurnId;
use proptest::prelude::*;

fn arb_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        Just(SessionEvent::InitializeRequested),
        Just(SessionEvent::Initialized),
        (0u64..4).prop_map(|n| SessionEvent::SendRequested {
            turn_id: TurnId::Provisional(n)
        }),
        Just(SessionEvent::StreamCompleted),
        "[a-z ]{1,12}".prop_map(|message| SessionEvent::OperationFailed { message }),
    ]
}

fn arb_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Idle),
        Just(SessionState::Initializing),
        Just(SessionState::Ready),
        (0u64..4).prop_map(|n| SessionState::Sending {
            turn_id: TurnId::Provisional(n)
        }),
        prop_oneof![Just(Operation::Initialize), Just(Operation::Send)].prop_map(|operation| {
            SessionState::Failed {
                operation,
                message: "boom".to_string(),
            }
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Sending is only ever entered from a session whose history is loaded
    #[test]
    fn prop_sending_requires_open_session(state in arb_state(), event in arb_event()) {
        if let Ok(next) = transition(&state, event) {
            if matches!(next, SessionState::Sending { .. }) {
                prop_assert!(state.is_open(), "Entered Sending from {:?}", state);
                prop_assert!(!state.is_busy());
            }
        }
    }

    // At most one send in flight
    #[test]
    fn prop_busy_rejects_send(n in 0u64..4, m in 0u64..4) {
        let state = SessionState::Sending { turn_id: TurnId::Provisional(n) };
        let result = transition(&state, SessionEvent::SendRequested { turn_id: TurnId::Provisional(m) });
        prop_assert_eq!(result, Err(TransitionError::Busy));
    }

    // Any failure can be retried back to Ready
    #[test]
    fn prop_failed_is_recoverable(operation in prop_oneof![Just(Operation::Initialize), Just(Operation::Send)]) {
        let state = SessionState::Failed { operation, message: "x".to_string() };
        let recovered = match operation {
            Operation::Initialize => transition(&state, SessionEvent::InitializeRequested)
                .and_then(|s| transition(&s, SessionEvent::Initialized)),
            Operation::Send => transition(&state, SessionEvent::SendRequested { turn_id: TurnId::Provisional(9) })
                .and_then(|s| transition(&s, SessionEvent::StreamCompleted)),
        };
        prop_assert_eq!(recovered, Ok(SessionState::Ready));
    }

    // Replaying events never strands a session busy with nothing pending
    #[test]
    fn prop_busy_states_resolve(events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut state = SessionState::Idle;
        for event in events {
            if let Ok(next) = transition(&state, event) {
                state = next;
            }
        }
        let settled = match &state {
            SessionState::Initializing => transition(&state, SessionEvent::Initialized),
            SessionState::Sending { .. } => transition(&state, SessionEvent::StreamCompleted),
            _ => Ok(state.clone()),
        };
        prop_assert!(settled.is_ok());
        prop_assert!(!settled.unwrap().is_busy());
    }
}
