//! Backend request and response types

use crate::turn::{deserialize_id, SimilarityScores, Turn, TurnId};
use serde::{Deserialize, Serialize};

/// Request to create or reopen a session
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<&'a str>,
}

/// Session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(alias = "chat_name")]
    pub name: String,
    #[serde(default, alias = "messageCount")]
    pub message_count: u64,
    #[serde(default, alias = "lastAccessed")]
    pub last_accessed: Option<String>,
    #[serde(default, alias = "systemInstructions")]
    pub system_instructions: Option<String>,
}

impl SessionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_count: 0,
            last_accessed: None,
            system_instructions: None,
        }
    }
}

/// Request to stream a reply to one user message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRequest {
    pub session_name: String,
    pub message: String,
    /// Skip semantic retrieval and use the entire history as context
    pub use_full_history_mode: bool,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    text: String,
}

/// A persisted turn as the history endpoint returns it
#[derive(Debug, Deserialize)]
pub(crate) struct WireTurn {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    user: WireText,
    #[serde(alias = "llm")]
    assistant: WireText,
}

impl From<WireTurn> for Turn {
    fn from(wire: WireTurn) -> Self {
        Turn::new(TurnId::Final(wire.id), wire.user.text, wire.assistant.text)
    }
}

/// History arrives either bare or wrapped in `{"history": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum HistoryResponse {
    Wrapped { history: Vec<WireTurn> },
    Bare(Vec<WireTurn>),
}

impl HistoryResponse {
    pub(crate) fn into_turns(self) -> Vec<Turn> {
        let turns = match self {
            HistoryResponse::Wrapped { history } | HistoryResponse::Bare(history) => history,
        };
        turns.into_iter().map(Turn::from).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SimilarityResponse {
    #[serde(default, alias = "similarityScores")]
    pub similarity_scores: SimilarityScores,
}
