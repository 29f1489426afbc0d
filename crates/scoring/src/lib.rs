//! Scoring
//!
//! Pure mark computation for exam attempts:
//! - raw score from an answer sheet against the question bank
//! - tiered penalty multipliers selected by violation count
//! - grading and pass-rate helpers for results reporting
//!
//! Everything here is deterministic: identical inputs always produce
//! identical marks, so re-running a finalize computation is harmless.

mod grade;
mod penalty;

pub use grade::{pass_rate, Grade, GradeScale};
pub use penalty::{round2, PenaltyPolicy};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One of the four answer choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

/// One submitted answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    pub selected: AnswerOption,
}

/// Marking key for one question
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub correct: AnswerOption,
    pub marks: f64,
}

/// Interface to the exam-authoring collaborator: resolves a question id
/// to its marking key. Unknown ids score zero.
pub trait QuestionBank: Send + Sync {
    fn question(&self, question_id: i64) -> Option<QuestionSpec>;
}

/// In-memory question bank
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionBank {
    questions: HashMap<i64, QuestionSpec>,
}

impl StaticQuestionBank {
    pub fn new(questions: impl IntoIterator<Item = (i64, QuestionSpec)>) -> Self {
        Self {
            questions: questions.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Maximum achievable raw score
    pub fn total_marks(&self) -> f64 {
        self.questions.values().map(|q| q.marks).sum()
    }
}

impl QuestionBank for StaticQuestionBank {
    fn question(&self, question_id: i64) -> Option<QuestionSpec> {
        self.questions.get(&question_id).copied()
    }
}

/// Sum of marks for answers matching their question's designated correct
/// option.
pub fn raw_score(answers: &[SubmittedAnswer], bank: &dyn QuestionBank) -> f64 {
    let mut total = 0.0;
    for answer in answers {
        match bank.question(answer.question_id) {
            Some(spec) if spec.correct == answer.selected => total += spec.marks,
            Some(_) => {}
            None => debug!("Answer references unknown question {}", answer.question_id),
        }
    }
    total
}
