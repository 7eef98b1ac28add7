//! Session lifecycle states and the pure transition function

use crate::turn::TurnId;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which operation a failed session was attempting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    Send,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Initialize => f.write_str("initialize"),
            Operation::Send => f.write_str("send"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing loaded yet
    #[default]
    Idle,
    Initializing,
    Ready,
    /// One message in flight under a provisional id
    Sending { turn_id: TurnId },
    Failed { operation: Operation, message: String },
}

impl SessionState {
    /// History is loaded and may be sent to
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            SessionState::Ready
                | SessionState::Sending { .. }
                | SessionState::Failed {
                    operation: Operation::Send,
                    ..
                }
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Sending { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Initializing => f.write_str("initializing"),
            SessionState::Ready => f.write_str("ready"),
            SessionState::Sending { turn_id } => write!(f, "sending {turn_id}"),
            SessionState::Failed { operation, message } => write!(f, "{operation} failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    InitializeRequested,
    Initialized,
    SendRequested { turn_id: TurnId },
    StreamCompleted,
    OperationFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Session is busy (cancel the in-flight operation first)")]
    Busy,
    #[error("Session is not initialized")]
    NotReady,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Rejected events leave the caller's state untouched.
pub fn transition(state: &SessionState, event: SessionEvent) -> Result<SessionState, TransitionError> {
    match (state, event) {
        // Opening, or reopening after any settled state
        (
            SessionState::Idle | SessionState::Ready | SessionState::Failed { .. },
            SessionEvent::InitializeRequested,
        ) => Ok(SessionState::Initializing),
        (SessionState::Initializing | SessionState::Sending { .. }, SessionEvent::InitializeRequested) => {
            Err(TransitionError::Busy)
        }

        (SessionState::Initializing, SessionEvent::Initialized) => Ok(SessionState::Ready),

        // A failed send is retried by sending again
        (
            SessionState::Ready
            | SessionState::Failed {
                operation: Operation::Send,
                ..
            },
            SessionEvent::SendRequested { turn_id },
        ) => Ok(SessionState::Sending { turn_id }),
        (SessionState::Sending { .. }, SessionEvent::SendRequested { .. }) => Err(TransitionError::Busy),
        (
            SessionState::Idle | SessionState::Initializing | SessionState::Failed { .. },
            SessionEvent::SendRequested { .. },
        ) => Err(TransitionError::NotReady),

        (SessionState::Sending { .. }, SessionEvent::StreamCompleted) => Ok(SessionState::Ready),

        (SessionState::Initializing, SessionEvent::OperationFailed { message }) => Ok(SessionState::Failed {
            operation: Operation::Initialize,
            message,
        }),
        (SessionState::Sending { .. }, SessionEvent::OperationFailed { message }) => Ok(SessionState::Failed {
            operation: Operation::Send,
            message,
        }),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {state}"
        ))),
    }
}
