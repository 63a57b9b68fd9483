use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final classification of one grading attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimit,
    CompilationError,
    RuntimeError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::TimeLimit => "time_limit",
            Verdict::CompilationError => "compilation_error",
            Verdict::RuntimeError => "runtime_error",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Immutable record of one grading attempt. Append-only: rows are inserted
/// once and never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: String,
    pub progress_id: String,
    /// Sequential per-progress attempt number, contiguous from 1.
    pub attempt_no: u32,
    pub code: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub passed_tests: u32,
    pub total_tests: u32,
    pub submitted_at: DateTime<Utc>,
}
