//! Retrieval/LLM backend boundary
//!
//! Sessions, history, and similarity scoring all live behind this trait so the
//! controller can be driven by a scripted backend in tests.

mod error;
mod http;
mod types;

#[cfg(test)]
pub mod testing;

pub use error::{ClientError, ClientErrorKind};
pub use http::HttpCollaborator;
pub use types::{CreateSessionRequest, MessageRequest, SessionInfo};

use crate::turn::{SimilarityScores, Turn};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Instant;

/// Raw body fragments of a streamed reply, chunked however the transport likes
pub type FragmentStream = BoxStream<'static, Result<Vec<u8>, ClientError>>;

/// Operations the controller needs from the backend
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Create the session, or return its metadata if it already exists
    async fn open_session(
        &self,
        name: &str,
        system_instructions: Option<&str>,
    ) -> Result<SessionInfo, ClientError>;

    /// Full history in server order
    async fn fetch_history(&self, name: &str) -> Result<Vec<Turn>, ClientError>;

    /// Start a streamed reply. Errors here mean the stream never opened.
    async fn stream_message(&self, request: &MessageRequest) -> Result<FragmentStream, ClientError>;

    /// Scores of every history turn against the latest query
    async fn last_similarities(&self, name: &str) -> Result<SimilarityScores, ClientError>;
}

#[async_trait]
impl<T: Collaborator + ?Sized> Collaborator for Arc<T> {
    async fn open_session(
        &self,
        name: &str,
        system_instructions: Option<&str>,
    ) -> Result<SessionInfo, ClientError> {
        (**self).open_session(name, system_instructions).await
    }

    async fn fetch_history(&self, name: &str) -> Result<Vec<Turn>, ClientError> {
        (**self).fetch_history(name).await
    }

    async fn stream_message(&self, request: &MessageRequest) -> Result<FragmentStream, ClientError> {
        (**self).stream_message(request).await
    }

    async fn last_similarities(&self, name: &str) -> Result<SimilarityScores, ClientError> {
        (**self).last_similarities(name).await
    }
}

/// Logging wrapper for collaborators
pub struct LoggingCollaborator<C> {
    inner: C,
}

impl<C: Collaborator> LoggingCollaborator<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    fn log<T>(operation: &str, session: &str, start: Instant, result: &Result<T, ClientError>) {
        let duration_ms = start.elapsed().as_millis();
        match result {
            Ok(_) => tracing::debug!(operation, session, duration_ms, "Backend call completed"),
            Err(e) => tracing::warn!(
                operation,
                session,
                duration_ms,
                kind = %e.kind,
                status = e.status,
                error = %e.message,
                "Backend call failed"
            ),
        }
    }
}

#[async_trait]
impl<C: Collaborator> Collaborator for LoggingCollaborator<C> {
    async fn open_session(
        &self,
        name: &str,
        system_instructions: Option<&str>,
    ) -> Result<SessionInfo, ClientError> {
        let start = Instant::now();
        let result = self.inner.open_session(name, system_instructions).await;
        Self::log("open_session", name, start, &result);
        result
    }

    async fn fetch_history(&self, name: &str) -> Result<Vec<Turn>, ClientError> {
        let start = Instant::now();
        let result = self.inner.fetch_history(name).await;
        Self::log("fetch_history", name, start, &result);
        if let Ok(turns) = &result {
            tracing::info!(session = name, turns = turns.len(), "History loaded");
        }
        result
    }

    async fn stream_message(&self, request: &MessageRequest) -> Result<FragmentStream, ClientError> {
        let start = Instant::now();
        let result = self.inner.stream_message(request).await;
        Self::log("stream_message", &request.session_name, start, &result);
        result
    }

    async fn last_similarities(&self, name: &str) -> Result<SimilarityScores, ClientError> {
        let start = Instant::now();
        let result = self.inner.last_similarities(name).await;
        Self::log("last_similarities", name, start, &result);
        result
    }
}
