// src/session/answer.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Addresses one recordable cell of an attempt.
///
/// Every slot resolves against the owning session's question set before a
/// value is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum AnswerSlot {
    /// A whole top-level question (choice or free text).
    Question { question_id: i64 },
    /// One left-item row of a matching question.
    MatchingCell { question_id: i64, left: usize },
    /// A sub-question of a composite question.
    SubQuestion { question_id: i64, sub_question_id: i64 },
}

/// The recorded value for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Chosen option text or free text.
    Text(String),
    /// Picked right-side index for a matching cell.
    Pick(usize),
}

/// One `slot -> value` entry, as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    #[serde(flatten)]
    pub slot: AnswerSlot,
    pub value: AnswerValue,
}

/// The answer map of a live attempt. Lives and dies with its session, so
/// stale entries from a previous attempt cannot leak in.
#[derive(Debug, Clone, Default)]
pub struct AnswerSheet {
    entries: HashMap<AnswerSlot, AnswerValue>,
}

impl AnswerSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value for a slot.
    ///
    /// With `allow_revision` the write is unconditional (a student may change
    /// their mind any time before submitting). Without it, an occupied slot
    /// is locked and re-recording is rejected.
    pub fn record(
        &mut self,
        slot: AnswerSlot,
        value: AnswerValue,
        allow_revision: bool,
    ) -> Result<(), AppError> {
        if !allow_revision && self.entries.contains_key(&slot) {
            return Err(AppError::Conflict(
                "This answer is locked and cannot be changed".to_string(),
            ));
        }
        self.entries.insert(slot, value);
        Ok(())
    }

    pub fn get(&self, slot: &AnswerSlot) -> Option<&AnswerValue> {
        self.entries.get(slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in slot order (deterministic for views and tests).
    pub fn entries(&self) -> Vec<AnswerEntry> {
        let mut list: Vec<AnswerEntry> = self
            .entries
            .iter()
            .map(|(slot, value)| AnswerEntry {
                slot: *slot,
                value: value.clone(),
            })
            .collect();
        list.sort_by_key(|e| e.slot);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_allowed_overwrites() {
        let mut sheet = AnswerSheet::new();
        let slot = AnswerSlot::Question { question_id: 1 };

        sheet
            .record(slot, AnswerValue::Text("A".to_string()), true)
            .unwrap();
        sheet
            .record(slot, AnswerValue::Text("B".to_string()), true)
            .unwrap();

        assert_eq!(sheet.get(&slot), Some(&AnswerValue::Text("B".to_string())));
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn revision_disabled_locks_slot() {
        let mut sheet = AnswerSheet::new();
        let slot = AnswerSlot::Question { question_id: 1 };

        sheet
            .record(slot, AnswerValue::Text("A".to_string()), false)
            .unwrap();
        let second = sheet.record(slot, AnswerValue::Text("B".to_string()), false);

        assert!(second.is_err());
        assert_eq!(sheet.get(&slot), Some(&AnswerValue::Text("A".to_string())));
    }

    #[test]
    fn matching_cells_are_distinct_slots() {
        let mut sheet = AnswerSheet::new();
        for left in 0..3 {
            sheet
                .record(
                    AnswerSlot::MatchingCell {
                        question_id: 9,
                        left,
                    },
                    AnswerValue::Pick(left),
                    true,
                )
                .unwrap();
        }
        assert_eq!(sheet.len(), 3);
    }

    #[test]
    fn entries_are_sorted_by_slot() {
        let mut sheet = AnswerSheet::new();
        sheet
            .record(
                AnswerSlot::MatchingCell {
                    question_id: 2,
                    left: 1,
                },
                AnswerValue::Pick(0),
                true,
            )
            .unwrap();
        sheet
            .record(
                AnswerSlot::Question { question_id: 5 },
                AnswerValue::Text("x".to_string()),
                true,
            )
            .unwrap();
        sheet
            .record(
                AnswerSlot::MatchingCell {
                    question_id: 2,
                    left: 0,
                },
                AnswerValue::Pick(1),
                true,
            )
            .unwrap();

        let entries = sheet.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].slot, AnswerSlot::Question { question_id: 5 });
        assert_eq!(
            entries[1].slot,
            AnswerSlot::MatchingCell {
                question_id: 2,
                left: 0
            }
        );
    }
}
