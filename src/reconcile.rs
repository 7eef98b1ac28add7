//! Optimistic turn reconciliation
//!
//! The full history and the context window receive the same
//! begin/append/finalize/discard operations for the in-flight turn. One
//! generic collection implements them; the record type decides what a fresh
//! provisional record looks like.

mod store;

#[cfg(test)]
mod proptests;

pub use store::TurnCollection;

use crate::turn::{ContextEntry, Turn, TurnId};
use thiserror::Error;

/// Full chronological history
pub type TurnStore = TurnCollection<Turn>;

/// Turns relevant to the latest query, with similarity scores
pub type ContextWindow = TurnCollection<ContextEntry>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("turn {0} already exists")]
    DuplicateId(TurnId),
    #[error("cannot finalize {provisional} as {final_id}: id already present")]
    IdCollision { provisional: TurnId, final_id: TurnId },
}

/// A record holding one turn
pub trait TurnRecord {
    /// Fresh record for a just-submitted message, with empty assistant text
    fn provisional(id: TurnId, user_text: &str) -> Self;

    fn turn(&self) -> &Turn;

    fn turn_mut(&mut self) -> &mut Turn;
}

impl TurnRecord for Turn {
    fn provisional(id: TurnId, user_text: &str) -> Self {
        Turn::new(id, user_text, "")
    }

    fn turn(&self) -> &Turn {
        self
    }

    fn turn_mut(&mut self) -> &mut Turn {
        self
    }
}

impl TurnRecord for ContextEntry {
    fn provisional(id: TurnId, user_text: &str) -> Self {
        ContextEntry::current(Turn::new(id, user_text, ""))
    }

    fn turn(&self) -> &Turn {
        &self.turn
    }

    fn turn_mut(&mut self) -> &mut Turn {
        &mut self.turn
    }
}
