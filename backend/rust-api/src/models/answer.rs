use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::AnswerValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub selected: AnswerValue,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAnswerRequest {
    pub question_id: String,
    pub value: AnswerValue,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordAnswerResponse {
    pub question_id: String,
    pub answered_count: usize,
    pub remaining_seconds: Option<u64>,
}
