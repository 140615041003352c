//! Grading of a ledger snapshot against the session's question set.
//!
//! Pure: no clocks, no I/O, ordered containers only, so the same input always
//! produces the same sheet.

use std::collections::BTreeMap;

use crate::models::question::{AnswerValue, Question};
use crate::models::result::AnswerReview;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSheet {
    pub score: u32,
    pub total: u32,
    pub percentage: u32,
    pub answers: Vec<AnswerReview>,
    pub topic_stats: BTreeMap<String, u32>,
}

/// `selections[i]` is the answer to `questions[i]`; missing trailing entries
/// count as unanswered.
pub fn score(questions: &[Question], selections: &[Option<AnswerValue>]) -> ScoreSheet {
    let mut per_topic: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

    let answers: Vec<AnswerReview> = questions
        .iter()
        .enumerate()
        .map(|(idx, question)| {
            let selected = selections.get(idx).cloned().flatten();
            let is_correct = selected
                .as_ref()
                .is_some_and(|value| value.matches(&question.correct_answer));

            let counts = per_topic.entry(question.topic.as_str()).or_default();
            counts.1 += 1;
            if is_correct {
                counts.0 += 1;
            }

            AnswerReview {
                question_id: question.id.clone(),
                content: question.content.clone(),
                topic: question.topic.clone(),
                selected,
                correct: question.correct_answer.clone(),
                is_correct,
                explanation: question.explanation.clone(),
            }
        })
        .collect();

    let score = answers.iter().filter(|a| a.is_correct).count() as u32;
    let total = answers.len() as u32;

    let topic_stats = per_topic
        .into_iter()
        .map(|(topic, (correct, seen))| (topic.to_string(), rounded_percent(correct, seen)))
        .collect();

    ScoreSheet {
        score,
        total,
        percentage: rounded_percent(score, total),
        answers,
        topic_stats,
    }
}

/// `round(100 * part / whole)` with halves rounded up; 0 when `whole` is 0.
pub fn rounded_percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let (part, whole) = (u64::from(part), u64::from(whole));
    ((part * 200 + whole) / (whole * 2)) as u32
}
