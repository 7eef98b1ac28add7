//! Per-session orchestration
//!
//! [`state`] holds the pure lifecycle transition function; [`controller`]
//! performs the I/O around it.

mod controller;
pub mod state;

#[cfg(test)]
mod proptests;

pub use controller::{SessionController, SessionError, SessionViews, SimilarityReport};
pub use state::{transition, Operation, SessionEvent, SessionState, TransitionError};
