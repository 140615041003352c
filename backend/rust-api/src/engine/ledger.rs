use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::error::SessionError;
use crate::models::answer::LedgerEntry;
use crate::models::question::{AnswerValue, Question};

/// Record of the student's current selections for one attempt.
#[derive(Debug, Default)]
pub struct AnswerLedger {
    lock_on_select: bool,
    entries: HashMap<String, LedgerEntry>,
}

impl AnswerLedger {
    pub fn new(lock_on_select: bool) -> Self {
        Self {
            lock_on_select,
            entries: HashMap::new(),
        }
    }

    pub fn set(&mut self, question_id: &str, value: AnswerValue) -> Result<(), SessionError> {
        let locked = self.lock_on_select;
        let entry = LedgerEntry {
            selected: value,
            answered_at: Utc::now(),
        };

        match self.entries.entry(question_id.to_string()) {
            Entry::Occupied(_) if locked => {
                Err(SessionError::AlreadyAnswered(question_id.to_string()))
            }
            Entry::Occupied(mut existing) => {
                existing.insert(entry);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn get(&self, question_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(question_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Selections aligned to `questions`, with `None` for every unanswered one.
    pub fn snapshot(&self, questions: &[Question]) -> Vec<Option<AnswerValue>> {
        questions
            .iter()
            .map(|question| self.get(&question.id).map(|entry| entry.selected.clone()))
            .collect()
    }
}
