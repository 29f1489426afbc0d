//! Grading and pass-rate helpers for results reporting

use serde::{Deserialize, Serialize};

/// Letter grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    F,
}

/// Grade boundaries as fractions of the maximum score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeScale {
    pub a_ratio: f64,
    pub b_ratio: f64,
    pub c_ratio: f64,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            a_ratio: 0.8,
            b_ratio: 0.6,
            c_ratio: 0.4,
        }
    }
}

impl GradeScale {
    pub fn grade(&self, marks: f64, max_marks: f64) -> Grade {
        if max_marks <= 0.0 {
            return Grade::F;
        }
        let ratio = marks / max_marks;
        if ratio >= self.a_ratio {
            Grade::A
        } else if ratio >= self.b_ratio {
            Grade::B
        } else if ratio >= self.c_ratio {
            Grade::C
        } else {
            Grade::F
        }
    }
}

/// Percentage of scores at or above `pass_ratio` of the maximum
pub fn pass_rate(marks: &[f64], max_marks: f64, pass_ratio: f64) -> f64 {
    if marks.is_empty() || max_marks <= 0.0 {
        return 0.0;
    }
    let passed = marks
        .iter()
        .filter(|&&m| m >= max_marks * pass_ratio)
        .count();
    passed as f64 / marks.len() as f64 * 100.0
}
