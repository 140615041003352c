use thiserror::Error;

use crate::models::exam::SessionState;

/// Every failure the session engine reports. All of them are recoverable:
/// the session either stays where it was or moves to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("question {0} is already answered and locked")]
    AlreadyAnswered(String),

    #[error("no questions available for this exam")]
    EmptyQuestionSet,

    #[error("question {0} is not part of this session")]
    UnknownQuestion(String),

    #[error("answer is not an option of question {0}")]
    InvalidOption(String),

    #[error("question {id} is malformed: {reason}")]
    InvalidQuestion { id: String, reason: String },

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("failed to load questions: {0}")]
    QuestionSource(String),

    #[error("result could not be persisted: {0}")]
    PersistenceFailure(String),
}
