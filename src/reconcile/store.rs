//! Ordered, id-keyed turn collection

use super::{ReconcileError, TurnRecord};
use crate::turn::{ContextEntry, TurnId};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TurnCollection<R> {
    records: Vec<R>,
}

impl<R> Default for TurnCollection<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R: TurnRecord> TurnCollection<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records in order, keeping the first of any repeated id
    pub fn from_records(records: impl IntoIterator<Item = R>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| {
                let id = &record.turn().id;
                let fresh = seen.insert(id.clone());
                if !fresh {
                    tracing::warn!(turn_id = %id, "Dropping repeated turn id");
                }
                fresh
            })
            .collect();
        Self { records }
    }

    /// Append a provisional record with empty assistant text
    pub fn begin(&mut self, id: TurnId, user_text: &str) -> Result<&R, ReconcileError> {
        if self.contains(&id) {
            return Err(ReconcileError::DuplicateId(id));
        }
        self.records.push(R::provisional(id, user_text));
        let index = self.records.len() - 1;
        Ok(&self.records[index])
    }

    /// Concatenate streamed text onto a record. Returns false on a lookup miss.
    pub fn append_assistant_text(&mut self, id: &TurnId, delta: &str) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.turn_mut().assistant_text.push_str(delta);
                true
            }
            None => {
                tracing::warn!(turn_id = %id, len = delta.len(), "Dropping text for unknown turn");
                false
            }
        }
    }

    /// Swap a provisional id for the final one in place
    ///
    /// Returns `Ok(false)` when the provisional id is gone (already rolled
    /// back); that is a lookup miss, not an error.
    pub fn finalize(&mut self, provisional: &TurnId, final_id: TurnId) -> Result<bool, ReconcileError> {
        let Some(index) = self.position(provisional) else {
            tracing::warn!(turn_id = %provisional, final_id = %final_id, "Finalize for unknown turn");
            return Ok(false);
        };
        if *provisional != final_id && self.contains(&final_id) {
            return Err(ReconcileError::IdCollision {
                provisional: provisional.clone(),
                final_id,
            });
        }
        self.records[index].turn_mut().id = final_id;
        Ok(true)
    }

    /// Remove a record. Returns false if it was not present.
    pub fn discard(&mut self, id: &TurnId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &TurnId) -> Option<&R> {
        self.position(id).map(|index| &self.records[index])
    }

    fn get_mut(&mut self, id: &TurnId) -> Option<&mut R> {
        self.position(id).map(move |index| &mut self.records[index])
    }

    pub fn contains(&self, id: &TurnId) -> bool {
        self.position(id).is_some()
    }

    // The in-flight turn sits at the end, so search from the back
    fn position(&self, id: &TurnId) -> Option<usize> {
        self.records.iter().rposition(|record| record.turn().id == *id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TurnId> {
        self.records.iter().map(|record| &record.turn().id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl TurnCollection<ContextEntry> {
    /// Replace the whole window with freshly retrieved entries plus the
    /// in-flight turn at similarity 1.0
    pub fn set_from_metadata(
        &mut self,
        entries: Vec<ContextEntry>,
        current_id: TurnId,
        current_user_text: &str,
    ) {
        let retrieved = entries.into_iter().filter(|entry| entry.turn.id != current_id);
        *self = Self::from_records(retrieved);
        self.records.push(ContextEntry::provisional(current_id, current_user_text));
    }

    /// Entries that count towards relevance statistics
    pub fn retrieved(&self) -> impl Iterator<Item = &ContextEntry> {
        self.records.iter().filter(|entry| !entry.current)
    }

    /// The newest in-flight entry
    pub fn current(&self) -> Option<&ContextEntry> {
        self.records.iter().rev().find(|entry| entry.current)
    }
}

impl<'a, R> IntoIterator for &'a TurnCollection<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
