//! Relevance tiers and aggregate statistics
//!
//! Pure functions only. Thresholds come from [`RelevanceConfig`].

use crate::config::RelevanceConfig;
use crate::turn::{ContextEntry, SimilarityScores, Turn};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceTier {
    High,
    Medium,
    Low,
}

impl RelevanceTier {
    pub fn label(self) -> &'static str {
        match self {
            RelevanceTier::High => "High",
            RelevanceTier::Medium => "Med",
            RelevanceTier::Low => "Low",
        }
    }
}

impl fmt::Display for RelevanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Each tier has a closed lower bound
pub fn classify(similarity: f64, high_threshold: f64, med_threshold: f64) -> RelevanceTier {
    if similarity >= high_threshold {
        RelevanceTier::High
    } else if similarity >= med_threshold {
        RelevanceTier::Medium
    } else {
        RelevanceTier::Low
    }
}

impl RelevanceConfig {
    pub fn classify(&self, similarity: f64) -> RelevanceTier {
        classify(similarity, self.high_threshold(), self.med_threshold())
    }
}

impl ContextEntry {
    pub fn tier(&self, config: &RelevanceConfig) -> RelevanceTier {
        config.classify(self.similarity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SessionStats {
    pub turn_count: usize,
    pub average_similarity: f64,
    pub high_tier_count: usize,
    pub total_word_count: usize,
}

/// Live stats over the context window; the current entry is skipped
pub fn compute_stats<'a, I>(entries: I, high_threshold: f64) -> SessionStats
where
    I: IntoIterator<Item = &'a ContextEntry>,
{
    let mut stats = SessionStats::default();
    let mut similarity_sum = 0.0;
    for entry in entries.into_iter().filter(|entry| !entry.current) {
        stats.turn_count += 1;
        similarity_sum += entry.similarity;
        if entry.similarity >= high_threshold {
            stats.high_tier_count += 1;
        }
        stats.total_word_count += entry.turn.word_count();
    }
    stats.average_similarity = mean(similarity_sum, stats.turn_count);
    stats
}

/// Full recompute over the history against the backend's latest score set
///
/// Words are counted over every history turn; similarity aggregates over
/// every returned score, matched to a history turn or not.
pub fn compute_history_stats<'a, I>(
    history: I,
    scores: &SimilarityScores,
    high_threshold: f64,
) -> SessionStats
where
    I: IntoIterator<Item = &'a Turn>,
{
    let mut stats = SessionStats::default();
    for turn in history {
        stats.turn_count += 1;
        stats.total_word_count += turn.word_count();
    }
    let similarity_sum: f64 = scores.values().sum();
    stats.high_tier_count = scores.values().filter(|s| **s >= high_threshold).count();
    stats.average_similarity = mean(similarity_sum, scores.len());
    stats
}

#[allow(clippy::cast_precision_loss)] // turn counts are far below 2^52
fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
