//! Scripted collaborator for tests
//!
//! Every call pops the next queued outcome; an empty queue answers with a
//! network error.

use super::{ClientError, Collaborator, FragmentStream, MessageRequest, SessionInfo};
use crate::stream::StreamEvent;
use crate::turn::{SimilarityScores, Turn};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// One step of a scripted reply body
#[derive(Debug)]
pub enum Fragment {
    Bytes(Vec<u8>),
    /// Transport failure mid-stream
    Fail(ClientError),
    /// Wait before the next fragment
    Delay(Duration),
    /// Never produce anything again
    Stall,
}

impl Fragment {
    pub fn event(event: &StreamEvent) -> Self {
        Fragment::Bytes(event.encode().into_bytes())
    }

    pub fn raw(text: &str) -> Self {
        Fragment::Bytes(text.as_bytes().to_vec())
    }
}

pub struct ScriptedCollaborator {
    sessions: Mutex<VecDeque<Result<SessionInfo, ClientError>>>,
    histories: Mutex<VecDeque<Result<Vec<Turn>, ClientError>>>,
    streams: Mutex<VecDeque<Result<Vec<Fragment>, ClientError>>>,
    similarities: Mutex<VecDeque<Result<SimilarityScores, ClientError>>>,
    /// Record of every stream request
    pub requests: Mutex<Vec<MessageRequest>>,
    /// Signalled each time a stream is handed out
    pub stream_opened: Arc<Notify>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            histories: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            similarities: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stream_opened: Arc::new(Notify::new()),
        }
    }

    pub fn queue_session(&self, outcome: Result<SessionInfo, ClientError>) {
        self.sessions.lock().unwrap().push_back(outcome);
    }

    pub fn queue_history(&self, outcome: Result<Vec<Turn>, ClientError>) {
        self.histories.lock().unwrap().push_back(outcome);
    }

    /// Queue a session open followed by its history
    pub fn queue_open(&self, name: &str, history: Vec<Turn>) {
        let mut info = SessionInfo::new(name);
        info.message_count = history.len() as u64;
        self.queue_session(Ok(info));
        self.queue_history(Ok(history));
    }

    pub fn queue_stream(&self, fragments: Vec<Fragment>) {
        self.streams.lock().unwrap().push_back(Ok(fragments));
    }

    /// Queue a well-formed reply, one fragment per event
    pub fn queue_events(&self, events: &[StreamEvent]) {
        self.queue_stream(events.iter().map(Fragment::event).collect());
    }

    /// The next stream request fails before any body arrives
    pub fn queue_stream_error(&self, error: ClientError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_similarities(&self, outcome: Result<SimilarityScores, ClientError>) {
        self.similarities.lock().unwrap().push_back(outcome);
    }

    pub fn recorded_requests(&self) -> Vec<MessageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for ScriptedCollaborator {
    fn default() -> Self {
        Self::new()
    }
}

fn next<T>(queue: &Mutex<VecDeque<Result<T, ClientError>>>) -> Result<T, ClientError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ClientError::network("No scripted response queued")))
}

fn play(fragments: Vec<Fragment>) -> FragmentStream {
    stream::unfold(VecDeque::from(fragments), |mut script| async move {
        loop {
            match script.pop_front()? {
                Fragment::Bytes(bytes) => return Some((Ok(bytes), script)),
                Fragment::Fail(error) => return Some((Err(error), script)),
                Fragment::Delay(duration) => tokio::time::sleep(duration).await,
                Fragment::Stall => std::future::pending::<()>().await,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl Collaborator for ScriptedCollaborator {
    async fn open_session(
        &self,
        _name: &str,
        _system_instructions: Option<&str>,
    ) -> Result<SessionInfo, ClientError> {
        next(&self.sessions)
    }

    async fn fetch_history(&self, _name: &str) -> Result<Vec<Turn>, ClientError> {
        next(&self.histories)
    }

    async fn stream_message(&self, request: &MessageRequest) -> Result<FragmentStream, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        let fragments = next(&self.streams)?;
        self.stream_opened.notify_one();
        Ok(play(fragments))
    }

    async fn last_similarities(&self, _name: &str) -> Result<SimilarityScores, ClientError> {
        next(&self.similarities)
    }
}
