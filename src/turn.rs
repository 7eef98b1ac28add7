//! Conversation turn types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Similarity score per final turn id, as sent by the backend
pub type SimilarityScores = HashMap<String, f64>;

/// Identifier of a turn
///
/// A provisional id is generated locally when the user submits a message and
/// lives until the backend confirms the turn with its final id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TurnId {
    Provisional(u64),
    Final(String),
}

impl TurnId {
    pub fn final_id(id: impl Into<String>) -> Self {
        TurnId::Final(id.into())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, TurnId::Provisional(_))
    }

    /// Key used by the backend's score maps; provisional ids have none
    pub fn score_key(&self) -> Option<&str> {
        match self {
            TurnId::Final(id) => Some(id),
            TurnId::Provisional(_) => None,
        }
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnId::Provisional(n) => write!(f, "pending-{n}"),
            TurnId::Final(id) => f.write_str(id),
        }
    }
}

/// One user/assistant exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: TurnId,
    pub user_text: String,
    pub assistant_text: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(id: TurnId, user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            id,
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            created_at: Utc::now(),
        }
    }

    /// Whitespace-delimited tokens across both sides of the exchange
    pub fn word_count(&self) -> usize {
        self.user_text.split_whitespace().count() + self.assistant_text.split_whitespace().count()
    }
}

/// A turn in the context window, tagged with its relevance to the live query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub turn: Turn,
    pub similarity: f64,
    /// A query turn the window was built for: always similarity 1.0, never
    /// counted in stats. The previous query's entry keeps the mark until the
    /// next metadata replaces the window, so begin and discard stay inverse;
    /// [`TurnCollection::current`](crate::reconcile::TurnCollection::current) picks the newest.
    pub current: bool,
}

impl ContextEntry {
    pub fn retrieved(turn: Turn, similarity: f64) -> Self {
        Self {
            turn,
            similarity: similarity.clamp(0.0, 1.0),
            current: false,
        }
    }

    pub fn current(turn: Turn) -> Self {
        Self {
            turn,
            similarity: 1.0,
            current: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Str(String),
}

/// Backend ids arrive as JSON numbers or strings; both become a string
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Str(s) => s,
    })
}
