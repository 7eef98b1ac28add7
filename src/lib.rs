//! Context Manager client
//!
//! Keeps a chat session's full history and its retrieved context window in
//! sync while replies stream in from a retrieval-augmented backend.

// Library-wide pedantic exemptions
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate, clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod reconcile;
pub mod relevance;
pub mod session;
pub mod stream;
pub mod turn;

pub use client::{ClientError, ClientErrorKind, Collaborator, HttpCollaborator, LoggingCollaborator};
pub use config::{Config, ConfigError, RelevanceConfig};
pub use reconcile::{ContextWindow, TurnStore};
pub use relevance::{RelevanceTier, SessionStats};
pub use session::{SessionController, SessionError, SessionState, SessionViews};
pub use stream::{decode_stream, StreamDecoder, StreamEvent};
pub use turn::{ContextEntry, Turn, TurnId};
