//! Typed stream events

use crate::turn::{deserialize_id, ContextEntry, SimilarityScores, Turn, TurnId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded protocol event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Retrieved context for the in-flight turn, sent before any text
    Metadata(Metadata),
    /// Incremental assistant output, concatenated in arrival order
    Chunk { text: String },
    /// Turn persisted; carries the permanent id
    Done {
        #[serde(alias = "final_id", deserialize_with = "deserialize_id")]
        turn_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub context_turns: Vec<ContextTurn>,
    #[serde(default)]
    pub similarity_scores: SimilarityScores,
}

/// A retrieved turn as carried by the metadata event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTurn {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub assistant: String,
}

impl Metadata {
    /// Context entries in server order; turns without a score get `fallback`
    pub fn context_entries(&self, fallback: f64) -> Vec<ContextEntry> {
        self.context_turns
            .iter()
            .map(|ct| {
                let similarity = self.similarity_scores.get(&ct.id).copied().unwrap_or(fallback);
                let turn = Turn::new(TurnId::final_id(ct.id.clone()), ct.user.clone(), ct.assistant.clone());
                ContextEntry::retrieved(turn, similarity)
            })
            .collect()
    }
}

impl StreamEvent {
    const KINDS: [&'static str; 3] = ["metadata", "chunk", "done"];

    pub fn chunk(text: impl Into<String>) -> Self {
        StreamEvent::Chunk { text: text.into() }
    }

    pub fn done(turn_id: impl Into<String>) -> Self {
        StreamEvent::Done {
            turn_id: turn_id.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Done { .. } => "done",
        }
    }

    /// Discriminant of a raw payload, if it names a known event
    pub(crate) fn known_kind(payload: &Value) -> Option<&'static str> {
        let kind = payload.get("type")?.as_str()?;
        Self::KINDS.iter().copied().find(|k| *k == kind)
    }

    /// Wire form: one `data:` line plus the blank separator line
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {json}\n\n")
    }
}
