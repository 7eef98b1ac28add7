//! Drives one chat session against a collaborator
//!
//! The controller owns both turn collections and publishes them together as a
//! single [`SessionViews`] value. Every stream event is applied inside one
//! `send_if_modified`, so observers only ever see whole events.

use super::state::{transition, SessionEvent, SessionState, TransitionError};
use crate::client::{ClientError, Collaborator, MessageRequest, SessionInfo};
use crate::config::{ClientConfig, Config, RelevanceConfig};
use crate::reconcile::{ContextWindow, ReconcileError, TurnStore};
use crate::relevance::{compute_history_stats, compute_stats, SessionStats};
use crate::stream::{decode_stream, StreamEvent};
use crate::turn::{SimilarityScores, TurnId};
use futures::StreamExt;
use serde::Serialize;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// What the controller surfaces to its caller
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A message is already in flight for this session")]
    Busy,
    #[error("Session is not initialized")]
    NotReady,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Session unavailable: {0}")]
    Unavailable(#[source] ClientError),
    #[error("Transport failure: {0}")]
    Transport(#[source] ClientError),
    #[error("Send cancelled")]
    Cancelled,
    #[error(transparent)]
    IdCollision(ReconcileError),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl From<TransitionError> for SessionError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Busy => SessionError::Busy,
            TransitionError::NotReady => SessionError::NotReady,
            TransitionError::InvalidTransition(msg) => SessionError::InvalidTransition(msg),
        }
    }
}

/// Everything a presentation layer renders, published as one value
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionViews {
    pub history: TurnStore,
    pub context: ContextWindow,
    /// Live stats over the context window
    pub stats: SessionStats,
}

/// Full-history relevance against the backend's latest query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityReport {
    pub scores: SimilarityScores,
    pub stats: SessionStats,
}

impl SimilarityReport {
    pub fn similarity(&self, id: &TurnId) -> Option<f64> {
        self.scores.get(id.score_key()?).copied()
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    info: Option<SessionInfo>,
    in_flight: Option<CancellationToken>,
}

pub struct SessionController<C> {
    collaborator: C,
    relevance: RelevanceConfig,
    stream_idle_timeout: Duration,
    stream_timeout: Duration,
    system_instructions: Option<String>,
    inner: Mutex<Inner>,
    views: watch::Sender<SessionViews>,
    next_provisional: AtomicU64,
}

impl<C: Collaborator> SessionController<C> {
    pub fn new(collaborator: C, config: &Config) -> Self {
        let ClientConfig {
            stream_idle_timeout,
            stream_timeout,
            system_instructions,
            ..
        } = config.client.clone();
        let (views, _) = watch::channel(SessionViews::default());
        Self {
            collaborator,
            relevance: config.relevance,
            stream_idle_timeout,
            stream_timeout,
            system_instructions,
            inner: Mutex::new(Inner::default()),
            views,
            next_provisional: AtomicU64::new(1),
        }
    }

    pub fn collaborator(&self) -> &C {
        &self.collaborator
    }

    pub fn relevance(&self) -> &RelevanceConfig {
        &self.relevance
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionViews> {
        self.views.subscribe()
    }

    /// Snapshot of both collections
    pub fn views(&self) -> SessionViews {
        self.views.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn info(&self) -> Option<SessionInfo> {
        self.lock().info.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: SessionEvent) -> Result<SessionState, TransitionError> {
        let mut inner = self.lock();
        let next = transition(&inner.state, event)?;
        tracing::debug!(from = %inner.state, to = %next, "Session transition");
        inner.state = next.clone();
        Ok(next)
    }

    /// Open (or create) the session and load its history
    ///
    /// On failure the session stays unopened; calling again retries.
    pub async fn initialize(&self, name: &str) -> Result<SessionInfo, SessionError> {
        self.apply(SessionEvent::InitializeRequested)?;

        let loaded = async {
            let info = self
                .collaborator
                .open_session(name, self.system_instructions.as_deref())
                .await?;
            let history = self.collaborator.fetch_history(name).await?;
            Ok::<_, ClientError>((info, history))
        }
        .await;

        match loaded {
            Ok((info, history)) => {
                let history = TurnStore::from_records(history);
                let turns = history.len();
                self.views.send_modify(|views| {
                    views.history = history;
                    views.context.clear();
                    views.stats = SessionStats::default();
                });
                self.lock().info = Some(info.clone());
                self.apply(SessionEvent::Initialized)?;
                tracing::info!(session = %name, turns, "Session initialized");
                Ok(info)
            }
            Err(e) => {
                tracing::error!(session = %name, kind = %e.kind, error = %e, "Session unavailable");
                // Nothing from a previously opened session survives a failed reopen
                self.lock().info = None;
                self.views.send_modify(|views| *views = SessionViews::default());
                self.apply(SessionEvent::OperationFailed {
                    message: e.to_string(),
                })?;
                Err(SessionError::Unavailable(e))
            }
        }
    }

    /// Send one message and stream the reply into both collections
    ///
    /// Returns the final id of the persisted turn. On any failure before the
    /// backend confirms the turn, the provisional turn is removed from both
    /// collections and the error is returned. Dropping the future rolls the
    /// turn back the same way.
    pub async fn send_message(&self, text: &str, use_full_history_mode: bool) -> Result<TurnId, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let session_name = self
            .lock()
            .info
            .as_ref()
            .map(|info| info.name.clone())
            .ok_or(SessionError::NotReady)?;

        let turn_id = TurnId::Provisional(self.next_provisional.fetch_add(1, Ordering::Relaxed));
        self.apply(SessionEvent::SendRequested {
            turn_id: turn_id.clone(),
        })?;

        let token = CancellationToken::new();
        self.lock().in_flight = Some(token.clone());
        let guard = TurnGuard {
            controller: self,
            turn_id: turn_id.clone(),
            armed: true,
        };

        let request = MessageRequest {
            session_name: session_name.clone(),
            message: text.to_string(),
            use_full_history_mode,
        };
        let outcome = match self.begin_turn(&turn_id, text) {
            Ok(()) => self.drive(&request, &turn_id, &token).await,
            Err(e) => Err(e),
        };
        guard.disarm();
        self.lock().in_flight = None;

        match outcome {
            Ok(final_id) => {
                if let Some(info) = self.lock().info.as_mut() {
                    info.message_count += 1;
                }
                self.apply(SessionEvent::StreamCompleted)?;
                tracing::info!(session = %session_name, turn_id = %final_id, "Turn finalized");
                Ok(final_id)
            }
            Err(e) => {
                self.rollback(&turn_id);
                tracing::error!(session = %session_name, turn_id = %turn_id, error = %e, "Send failed, turn rolled back");
                self.apply(SessionEvent::OperationFailed {
                    message: e.to_string(),
                })?;
                Err(e)
            }
        }
    }

    /// Abort the in-flight send, if any
    pub fn cancel(&self) -> bool {
        match &self.lock().in_flight {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Score the whole history against the latest query
    ///
    /// Independent of the live context window: the backend scores every
    /// history turn here, not just the retrieved ones.
    pub async fn similarity_report(&self) -> Result<SimilarityReport, SessionError> {
        let name = {
            let inner = self.lock();
            inner
                .info
                .as_ref()
                .filter(|_| inner.state.is_open())
                .map(|info| info.name.clone())
                .ok_or(SessionError::NotReady)?
        };
        let scores = self
            .collaborator
            .last_similarities(&name)
            .await
            .map_err(SessionError::Unavailable)?;
        let stats = compute_history_stats(&self.views.borrow().history, &scores, self.relevance.high_threshold());
        Ok(SimilarityReport { scores, stats })
    }

    fn begin_turn(&self, turn_id: &TurnId, text: &str) -> Result<(), SessionError> {
        let mut result = Ok(());
        self.views.send_if_modified(|views| {
            result = views
                .history
                .begin(turn_id.clone(), text)
                .map(|_| ())
                .and_then(|()| views.context.begin(turn_id.clone(), text).map(|_| ()));
            result.is_ok()
        });
        result.map_err(|e| SessionError::InvalidTransition(format!("cannot begin turn: {e}")))
    }

    async fn drive(
        &self,
        request: &MessageRequest,
        turn_id: &TurnId,
        token: &CancellationToken,
    ) -> Result<TurnId, SessionError> {
        let deadline = Instant::now() + self.stream_timeout;

        let fragments = tokio::select! {
            biased;
            () = token.cancelled() => return Err(SessionError::Cancelled),
            opened = timeout_at(deadline, self.collaborator.stream_message(request)) => match opened {
                Ok(Ok(fragments)) => fragments,
                Ok(Err(e)) => return Err(SessionError::Transport(e)),
                Err(_) => {
                    return Err(SessionError::Transport(ClientError::timeout(
                        "Stream did not open before the deadline",
                    )))
                }
            },
        };
        let mut events = pin!(decode_stream(fragments));

        loop {
            let idle = Instant::now() + self.stream_idle_timeout;
            let wake = idle.min(deadline);
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return Err(SessionError::Cancelled),
                next = timeout_at(wake, events.next()) => next,
            };
            let event = match next {
                Ok(Some(Ok(event))) => event,
                Ok(Some(Err(e))) => return Err(SessionError::Transport(e)),
                Ok(None) => {
                    return Err(SessionError::Transport(ClientError::network(
                        "Stream closed before the turn completed",
                    )))
                }
                Err(_) if wake == deadline => {
                    return Err(SessionError::Transport(ClientError::timeout(format!(
                        "Stream exceeded {}s overall",
                        self.stream_timeout.as_secs_f64()
                    ))))
                }
                Err(_) => {
                    return Err(SessionError::Transport(ClientError::timeout(format!(
                        "No stream data for {}s",
                        self.stream_idle_timeout.as_secs_f64()
                    ))))
                }
            };

            if let Some(final_id) = self.apply_event(turn_id, &request.message, event)? {
                return Ok(final_id);
            }
        }
    }

    /// Apply one decoded event to both collections. Returns the final id on `Done`.
    fn apply_event(
        &self,
        turn_id: &TurnId,
        user_text: &str,
        event: StreamEvent,
    ) -> Result<Option<TurnId>, SessionError> {
        match event {
            StreamEvent::Metadata(metadata) => {
                let entries = metadata.context_entries(self.relevance.fallback_similarity());
                let retrieved = entries.len();
                let high = self.relevance.high_threshold();
                self.views.send_modify(|views| {
                    views.context.set_from_metadata(entries, turn_id.clone(), user_text);
                    // Text streamed ahead of the metadata must survive the window swap
                    if let Some(turn) = views.history.get(turn_id) {
                        if !turn.assistant_text.is_empty() {
                            let text = turn.assistant_text.clone();
                            views.context.append_assistant_text(turn_id, &text);
                        }
                    }
                    views.stats = compute_stats(&views.context, high);
                });
                tracing::debug!(turn_id = %turn_id, retrieved, "Context window replaced");
                Ok(None)
            }
            StreamEvent::Chunk { text } => {
                self.views.send_if_modified(|views| {
                    let in_history = views.history.append_assistant_text(turn_id, &text);
                    let in_context = views.context.append_assistant_text(turn_id, &text);
                    in_history || in_context
                });
                tracing::debug!(turn_id = %turn_id, len = text.len(), "Chunk applied");
                Ok(None)
            }
            StreamEvent::Done { turn_id: final_id } => {
                let final_id = TurnId::Final(final_id);
                let mut result = Ok(());
                self.views.send_if_modified(|views| {
                    result = finalize_both(views, turn_id, &final_id);
                    result.is_ok()
                });
                result.map_err(SessionError::IdCollision)?;
                Ok(Some(final_id))
            }
        }
    }

    fn rollback(&self, turn_id: &TurnId) {
        let high = self.relevance.high_threshold();
        self.views.send_if_modified(|views| {
            let in_history = views.history.discard(turn_id);
            let in_context = views.context.discard(turn_id);
            if in_context {
                views.stats = compute_stats(&views.context, high);
            }
            in_history || in_context
        });
    }

    /// Undo a send whose future was dropped before it settled
    fn abandon(&self, turn_id: &TurnId) {
        self.rollback(turn_id);
        self.lock().in_flight = None;
        if let Err(e) = self.apply(SessionEvent::OperationFailed {
            message: "send dropped before completion".to_string(),
        }) {
            tracing::warn!(turn_id = %turn_id, error = %e, "Abandoned send left state unchanged");
        }
        tracing::warn!(turn_id = %turn_id, "Send dropped mid-stream, turn rolled back");
    }
}

/// Rolls the in-flight turn back on drop unless disarmed
struct TurnGuard<'a, C: Collaborator> {
    controller: &'a SessionController<C>,
    turn_id: TurnId,
    armed: bool,
}

impl<C: Collaborator> TurnGuard<'_, C> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C: Collaborator> Drop for TurnGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.controller.abandon(&self.turn_id);
        }
    }
}

/// Swap the id in both collections, or in neither
fn finalize_both(views: &mut SessionViews, provisional: &TurnId, final_id: &TurnId) -> Result<(), ReconcileError> {
    if views.history.contains(final_id) || views.context.contains(final_id) {
        return Err(ReconcileError::IdCollision {
            provisional: provisional.clone(),
            final_id: final_id.clone(),
        });
    }
    views.history.finalize(provisional, final_id.clone())?;
    views.context.finalize(provisional, final_id.clone())?;
    Ok(())
}
