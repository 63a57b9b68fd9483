use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::hint::HintLevel;
use crate::models::submission::Verdict;

/// Failed-attempt counts at which hint levels unlock. The stamps are set
/// once when the counter first reaches the threshold and never cleared.
pub const HINT_LEVEL1_THRESHOLD: u32 = 5;
pub const HINT_LEVEL2_THRESHOLD: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Solved,
}

/// Why a submit was turned away before it counted as an attempt. These are
/// policy outcomes, not errors: none of them mutate any counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    /// Task already solved and locked for further activity.
    Locked,
    TooFrequent { wait_seconds: i64 },
    NoCodeChange,
}

/// Per-student-per-task grading and hint state. One row per
/// (student_session, task) pair; the pair is unique in the store.
///
/// Invariants: attempts_failed <= attempts_total, both monotone
/// non-decreasing; unlock timestamps are write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_session_id: String,
    pub task_id: String,
    pub status: ProgressStatus,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub solved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts_total: u32,
    #[serde(default)]
    pub attempts_failed: u32,
    #[serde(default)]
    pub hint1_unlocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hint2_unlocked_at: Option<DateTime<Utc>>,
    /// Denormalized fast-path mirror of the latest delivered hint text.
    /// Write-once per level; the hint_messages collection stays the
    /// durable record.
    #[serde(default)]
    pub hint1_text: String,
    #[serde(default)]
    pub hint2_text: String,
    #[serde(default)]
    pub hint1_requests: u32,
    #[serde(default)]
    pub hint2_requests: u32,
    #[serde(default)]
    pub last_submit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_code_hash: String,
    #[serde(default = "default_locked_after_solve")]
    pub locked_after_solve: bool,
}

fn default_locked_after_solve() -> bool {
    true
}

impl TaskProgress {
    pub fn new(
        id: impl Into<String>,
        student_session_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            student_session_id: student_session_id.into(),
            task_id: task_id.into(),
            status: ProgressStatus::NotStarted,
            opened_at: None,
            solved_at: None,
            attempts_total: 0,
            attempts_failed: 0,
            hint1_unlocked_at: None,
            hint2_unlocked_at: None,
            hint1_text: String::new(),
            hint2_text: String::new(),
            hint1_requests: 0,
            hint2_requests: 0,
            last_submit_at: None,
            last_code_hash: String::new(),
            locked_after_solve: true,
        }
    }

    /// Solved tasks stay visible/submittable only while locked_after_solve
    /// is off; the default policy locks them.
    pub fn is_locked(&self) -> bool {
        self.status == ProgressStatus::Solved && self.locked_after_solve
    }

    /// First-view transition. Idempotent: the opened_at stamp is set once,
    /// repeat opens change nothing. Returns whether any field changed.
    pub fn mark_opened(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if self.opened_at.is_none() {
            self.opened_at = Some(now);
            changed = true;
        }
        if self.status == ProgressStatus::NotStarted {
            self.status = ProgressStatus::InProgress;
            changed = true;
        }
        changed
    }

    /// Anti-abuse gates, evaluated strictly before any counter moves.
    /// Checked in order: lock, cooldown, duplicate code.
    pub fn check_submit_gates(
        &self,
        now: DateTime<Utc>,
        code_hash: &str,
        cooldown: Duration,
    ) -> Result<(), SubmitRejection> {
        if self.is_locked() {
            return Err(SubmitRejection::Locked);
        }
        if let Some(last_submit_at) = self.last_submit_at {
            let elapsed = now - last_submit_at;
            if elapsed < cooldown {
                let wait_seconds = (cooldown - elapsed).num_seconds().max(1);
                return Err(SubmitRejection::TooFrequent { wait_seconds });
            }
        }
        if !self.last_code_hash.is_empty() && self.last_code_hash == code_hash {
            return Err(SubmitRejection::NoCodeChange);
        }
        Ok(())
    }

    /// Claims the next attempt number and stamps the anti-spam marks. Must
    /// only be called after check_submit_gates passed, serialized per
    /// progress by the caller. Returns the claimed attempt_no.
    pub fn claim_attempt(&mut self, now: DateTime<Utc>, code_hash: &str) -> u32 {
        self.attempts_total += 1;
        self.last_submit_at = Some(now);
        self.last_code_hash = code_hash.to_string();
        if self.status == ProgressStatus::NotStarted {
            self.status = ProgressStatus::InProgress;
        }
        if self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
        self.attempts_total
    }

    /// Applies the graded verdict of a claimed attempt. Accepted solves and
    /// locks the task; anything else counts a failure and re-evaluates the
    /// hint thresholds.
    pub fn apply_verdict(&mut self, verdict: Verdict, now: DateTime<Utc>) {
        if verdict.is_accepted() {
            self.status = ProgressStatus::Solved;
            self.solved_at = Some(now);
            self.locked_after_solve = true;
            return;
        }

        self.attempts_failed += 1;

        if self.attempts_failed >= HINT_LEVEL1_THRESHOLD && self.hint1_unlocked_at.is_none() {
            self.hint1_unlocked_at = Some(now);
        }
        if self.attempts_failed >= HINT_LEVEL2_THRESHOLD && self.hint2_unlocked_at.is_none() {
            self.hint2_unlocked_at = Some(now);
        }
    }

    pub fn hint_unlocked(&self, level: HintLevel) -> bool {
        match level {
            HintLevel::One => self.hint1_unlocked_at.is_some(),
            HintLevel::Two => self.hint2_unlocked_at.is_some(),
        }
    }

    pub fn cached_hint(&self, level: HintLevel) -> Option<&str> {
        let text = match level {
            HintLevel::One => self.hint1_text.as_str(),
            HintLevel::Two => self.hint2_text.as_str(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
