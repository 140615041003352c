use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod answer;
pub mod exam;
pub mod question;
pub mod result;
pub mod timer;

use exam::{ExamMode, SessionState};
use question::{PublicQuestion, QuestionFilter, QuestionSelector};
use result::Finalization;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub mode: ExamMode,
    #[validate(length(min = 1, max = 128))]
    pub exam_id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub user_id: Option<String>,
    #[validate(nested)]
    pub filter: Option<QuestionFilter>,
}

impl CreateSessionRequest {
    /// An explicit exam wins over a filter; neither means "any question".
    pub fn selector(&self) -> QuestionSelector {
        match (&self.exam_id, &self.filter) {
            (Some(exam_id), _) => QuestionSelector::Exam(exam_id.clone()),
            (None, Some(filter)) => QuestionSelector::Filter(filter.clone()),
            (None, None) => QuestionSelector::Filter(QuestionFilter::default()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub mode: ExamMode,
    pub questions: Vec<PublicQuestion>,
    pub time_budget_seconds: Option<u64>,
    pub lock_on_select: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Read-only view of a session, safe to serve at any point of its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub mode: ExamMode,
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub time_budget_seconds: Option<u64>,
    pub remaining_seconds: Option<u64>,
    pub answered: usize,
    pub total: usize,
    pub result: Option<Finalization>,
}
