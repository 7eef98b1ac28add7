//! Property-based tests for turn reconciliation
//!
//! Replaying one operation sequence against the history and the context
//! window must leave both with the same ids and identical assistant text.

use super::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Begin { id: u64, user: String },
    Append { id: u64, delta: String },
    Finalize { id: u64, final_id: u32 },
    Discard { id: u64 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        ((0u64..6), "[a-z ]{0,10}").prop_map(|(id, user)| Op::Begin { id, user }),
        ((0u64..6), "[a-zA-Z ]{0,10}").prop_map(|(id, delta)| Op::Append { id, delta }),
        ((0u64..6), (0u32..6)).prop_map(|(id, final_id)| Op::Finalize { id, final_id }),
        (0u64..6).prop_map(|id| Op::Discard { id }),
    ]
}

fn apply<R: TurnRecord>(collection: &mut TurnCollection<R>, op: &Op) -> String {
    // Outcome summary so both replays can be compared step by step
    match op {
        Op::Begin { id, user } => format!("{:?}", collection.begin(TurnId::Provisional(*id), user).is_ok()),
        Op::Append { id, delta } => {
            format!("{}", collection.append_assistant_text(&TurnId::Provisional(*id), delta))
        }
        Op::Finalize { id, final_id } => format!(
            "{:?}",
            collection.finalize(&TurnId::Provisional(*id), TurnId::final_id(final_id.to_string()))
        ),
        Op::Discard { id } => format!("{}", collection.discard(&TurnId::Provisional(*id))),
    }
}

fn snapshot<R: TurnRecord>(collection: &TurnCollection<R>) -> Vec<(TurnId, String, String)> {
    collection
        .iter()
        .map(|record| {
            let turn = record.turn();
            (turn.id.clone(), turn.user_text.clone(), turn.assistant_text.clone())
        })
        .collect()
}

proptest! {
    #[test]
    fn history_and_window_never_diverge(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut history = TurnStore::new();
        let mut window = ContextWindow::new();
        for op in &ops {
            let a = apply(&mut history, op);
            let b = apply(&mut window, op);
            prop_assert_eq!(a, b, "outcomes differ for {:?}", op);
            prop_assert_eq!(snapshot(&history), snapshot(&window));
        }
    }

    #[test]
    fn ids_stay_unique(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut history = TurnStore::new();
        for op in &ops {
            apply(&mut history, op);
            let ids: Vec<_> = history.ids().collect();
            let unique: std::collections::HashSet<_> = ids.iter().collect();
            prop_assert_eq!(ids.len(), unique.len());
        }
    }

    #[test]
    fn rollback_restores_id_set(
        existing in proptest::collection::vec(0u32..50, 0..8),
        deltas in proptest::collection::vec("[a-z ]{0,8}", 0..10),
    ) {
        let mut history = TurnStore::from_records(
            existing.iter().map(|id| Turn::new(TurnId::final_id(id.to_string()), "u", "a")),
        );
        let before: Vec<_> = history.ids().cloned().collect();

        let provisional = TurnId::Provisional(1);
        history.begin(provisional.clone(), "pending").unwrap();
        for delta in &deltas {
            prop_assert!(history.append_assistant_text(&provisional, delta));
        }
        prop_assert!(history.discard(&provisional));

        let after: Vec<_> = history.ids().cloned().collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn assistant_text_is_append_only(deltas in proptest::collection::vec("[a-z ]{0,8}", 1..10)) {
        let mut history = TurnStore::new();
        let id = TurnId::Provisional(3);
        history.begin(id.clone(), "q").unwrap();
        let mut previous = String::new();
        for delta in &deltas {
            history.append_assistant_text(&id, delta);
            let text = history.get(&id).unwrap().assistant_text.clone();
            prop_assert!(text.starts_with(&previous));
            previous = text;
        }
        prop_assert_eq!(previous, deltas.concat());
    }
}
