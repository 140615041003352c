use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::exam::{ExamMode, FinalizeCause};
use super::question::AnswerValue;

/// One graded line of a result, in question order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerReview {
    pub question_id: String,
    pub content: String,
    pub topic: String,
    pub selected: Option<AnswerValue>,
    pub correct: AnswerValue,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub session_id: String,
    pub mode: ExamMode,
    pub exam_id: Option<String>,
    pub user_id: Option<String>,
    /// Number of correctly answered questions.
    pub score: u32,
    pub total: u32,
    pub percentage: u32,
    pub answers: Vec<AnswerReview>,
    pub topic_stats: BTreeMap<String, u32>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub cause: FinalizeCause,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceOutcome {
    Skipped,
    Stored,
    Failed { reason: String },
}

impl PersistenceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PersistenceOutcome::Failed { .. })
    }
}

/// The single result of a session plus what happened when it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalization {
    pub result: ExamResult,
    pub persistence: PersistenceOutcome,
}
