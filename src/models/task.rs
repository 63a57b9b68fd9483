use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One test case of a task. Ordinals are unique within a task; visible
/// cases double as the examples shown to students, but grading always runs
/// every case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub ordinal: u32,
    pub stdin: String,
    pub expected_stdout: String,
    #[serde(default)]
    pub is_visible: bool,
}

/// Instructor-authored task inside an exam session. Immutable once the
/// session runs; students never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    /// Ordering in the task list, unique within a session.
    pub position: u32,
    pub title: String,
    pub statement: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn visible_test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(|tc| tc.is_visible)
    }
}
