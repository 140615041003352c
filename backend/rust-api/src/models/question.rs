use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

/// A selected or expected answer.
///
/// Single-key questions compare option values, multi-key questions compare
/// the set of selected option indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(String),
    Choices(BTreeSet<usize>),
}

impl AnswerValue {
    /// Grading comparison. Option values ignore surrounding whitespace.
    pub fn matches(&self, expected: &AnswerValue) -> bool {
        match (self, expected) {
            (AnswerValue::Choice(given), AnswerValue::Choice(wanted)) => {
                given.trim() == wanted.trim()
            }
            (AnswerValue::Choices(given), AnswerValue::Choices(wanted)) => given == wanted,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub options: Vec<String>,
    pub correct_answer: AnswerValue,
    pub topic: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
}

impl Question {
    /// Checks that the question has options and that its key points at one of them.
    pub fn validate_key(&self) -> Result<(), String> {
        if self.options.is_empty() {
            return Err("question has no options".to_string());
        }
        if !self.accepts(&self.correct_answer) {
            return Err("correct answer does not reference an existing option".to_string());
        }
        Ok(())
    }

    /// Whether `value` names existing options of this question in the shape
    /// its key uses: one option value, or a set of option indices.
    pub fn accepts(&self, value: &AnswerValue) -> bool {
        match (value, &self.correct_answer) {
            (AnswerValue::Choice(choice), AnswerValue::Choice(_)) => {
                self.options.iter().any(|option| option.trim() == choice.trim())
            }
            (AnswerValue::Choices(indices), AnswerValue::Choices(_)) => {
                !indices.is_empty() && indices.iter().all(|idx| *idx < self.options.len())
            }
            _ => false,
        }
    }

    pub fn is_multi_key(&self) -> bool {
        matches!(self.correct_answer, AnswerValue::Choices(_))
    }
}

/// Question as served to the student: no key, no explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: String,
    pub content: String,
    pub options: Vec<String>,
    pub topic: String,
    pub difficulty: String,
    pub multi_select: bool,
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        PublicQuestion {
            id: question.id.clone(),
            content: question.content.clone(),
            options: question.options.clone(),
            topic: question.topic.clone(),
            difficulty: question.difficulty.clone(),
            multi_select: question.is_multi_key(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct QuestionFilter {
    #[validate(length(min = 1, max = 100))]
    pub topic: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub difficulty: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub class_id: Option<String>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<u32>,
}

/// How a session picks its question set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSelector {
    Exam(String),
    Filter(QuestionFilter),
}
