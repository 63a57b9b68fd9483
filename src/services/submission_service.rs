use anyhow::Context;
use chrono::{Duration, Utc};
use mongodb::Database;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics::{JUDGE_FAILURES_TOTAL, SUBMISSIONS_TOTAL, SUBMIT_REJECTIONS_TOTAL};
use crate::middlewares::auth::StudentIdentity;
use crate::models::progress::{SubmitRejection, TaskProgress};
use crate::models::submission::{Submission, Verdict};
use crate::services::judge_client::{CaseResult, CaseStatus, JudgeClient};
use crate::services::progress_service::ProgressService;
use crate::services::session_service::SessionService;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Content hash used by the duplicate-code gate.
pub fn content_hash(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Single-verdict summary of an ordered case-result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingOutcome {
    pub verdict: Verdict,
    pub passed: u32,
    pub total: u32,
    pub stdout: String,
    pub stderr: String,
}

/// Folds per-case outcomes into one verdict: scan in order, stop at the
/// first non-accepted case. Priority: wrong-answer, time-limit,
/// compile-error, everything else (including cases still pending at the
/// poll deadline) grades as runtime error. Surfaced stdout/stderr are the
/// last case processed, not a concatenation.
pub fn interpret_results(results: &[CaseResult]) -> GradingOutcome {
    let mut passed: u32 = 0;
    let mut stdout_last = String::new();
    let mut stderr_last = String::new();
    let mut verdict = Verdict::RuntimeError;

    for result in results {
        stdout_last = result.stdout.clone();
        stderr_last = if !result.stderr.is_empty() {
            result.stderr.clone()
        } else if !result.compile_output.is_empty() {
            result.compile_output.clone()
        } else {
            result.message.clone()
        };

        match result.status {
            CaseStatus::Accepted => {
                passed += 1;
                continue;
            }
            CaseStatus::WrongAnswer => verdict = Verdict::WrongAnswer,
            CaseStatus::TimeLimit => verdict = Verdict::TimeLimit,
            CaseStatus::CompileError => verdict = Verdict::CompilationError,
            _ => verdict = Verdict::RuntimeError,
        }
        break;
    }

    if !results.is_empty() && passed as usize == results.len() {
        verdict = Verdict::Accepted;
    }
    if results.is_empty() {
        stderr_last = "judge returned no case results".to_string();
    }

    GradingOutcome {
        verdict,
        passed,
        total: results.len() as u32,
        stdout: stdout_last,
        stderr: stderr_last,
    }
}

/// Outcome of a submit request that passed validation.
pub enum SubmitOutcome {
    /// Task already solved and locked; a normal user-visible answer.
    Locked,
    Graded {
        submission: Submission,
        progress: TaskProgress,
    },
}

/// Top-level submit coordinator: access checks, anti-abuse gates, judge
/// batch, verdict mapping, progress transition, immutable submission row.
pub struct SubmissionService {
    mongo: Database,
    sessions: SessionService,
    progress: ProgressService,
    judge: JudgeClient,
    cooldown: Duration,
}

impl SubmissionService {
    pub fn new(
        mongo: Database,
        sessions: SessionService,
        progress: ProgressService,
        judge: JudgeClient,
        cooldown_seconds: i64,
    ) -> Self {
        Self {
            mongo,
            sessions,
            progress,
            judge,
            cooldown: Duration::seconds(cooldown_seconds),
        }
    }

    pub async fn submit(
        &self,
        identity: &StudentIdentity,
        task_id: &str,
        code_raw: &str,
    ) -> Result<SubmitOutcome, ApiError> {
        let now = Utc::now();
        let code = code_raw.trim_end();
        if code.is_empty() {
            return Err(ApiError::bad_request("code is required"));
        }

        let session = self
            .sessions
            .active_session_for_class(&identity.class_group_id, now)
            .await?
            .ok_or(ApiError::SessionInactive)?;

        let task = self
            .sessions
            .find_task_in_session(task_id, &session.id)
            .await?
            .ok_or_else(|| ApiError::not_found("task not found"))?;

        // Misconfigured tasks fail the request before anything counts.
        if task.test_cases.is_empty() {
            return Err(ApiError::Config(format!(
                "no test cases configured for task {}",
                task.id
            )));
        }

        let student_session = self
            .progress
            .get_or_create_student_session(&identity.student_id, &session.id, now)
            .await?;

        // A student who finished the session no longer submits to it.
        if student_session.is_finished() {
            return Err(ApiError::SessionInactive);
        }

        let progress = self
            .progress
            .get_or_create_progress(&student_session.id, &task.id)
            .await?;

        if progress.is_locked() {
            return Ok(SubmitOutcome::Locked);
        }

        let code_hash = content_hash(code);

        // The gate-check-then-claim sequence is serialized per progress so
        // concurrent submits can neither share an attempt_no nor both slip
        // past the gates against stale state.
        let lock = self
            .progress
            .acquire_submit_lock(&progress.id)
            .await?
            .ok_or(ApiError::TooFrequent {
                wait_seconds: self.cooldown.num_seconds(),
            })?;

        let fresh = match self.progress.find_progress(&progress.id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                let _ = self.progress.release_submit_lock(lock).await;
                return Err(ApiError::Internal(anyhow::anyhow!(
                    "progress {} vanished before claim",
                    progress.id
                )));
            }
            Err(e) => {
                let _ = self.progress.release_submit_lock(lock).await;
                return Err(e.into());
            }
        };

        if let Err(rejection) = fresh.check_submit_gates(now, &code_hash, self.cooldown) {
            let _ = self.progress.release_submit_lock(lock).await;
            return match rejection {
                SubmitRejection::Locked => Ok(SubmitOutcome::Locked),
                SubmitRejection::TooFrequent { wait_seconds } => {
                    SUBMIT_REJECTIONS_TOTAL
                        .with_label_values(&["too_frequent"])
                        .inc();
                    Err(ApiError::TooFrequent { wait_seconds })
                }
                SubmitRejection::NoCodeChange => {
                    SUBMIT_REJECTIONS_TOTAL
                        .with_label_values(&["no_code_change"])
                        .inc();
                    Err(ApiError::NoCodeChange)
                }
            };
        }

        let claim_result = self.progress.claim_attempt(&fresh, now, &code_hash).await;
        if let Err(e) = self.progress.release_submit_lock(lock).await {
            tracing::warn!("Failed to release submit lock: {:#}", e);
        }
        let claimed = claim_result.map_err(ApiError::from)?;
        let attempt_no = claimed.attempts_total;

        tracing::info!(
            "Grading attempt {} for student={} task={}",
            attempt_no,
            identity.student_id,
            task.id
        );

        // Judge failure is a graded outcome, not an exception: the attempt
        // still counts and the submission row still records it.
        let grading = match self.judge.run_batch(code, &task.test_cases).await {
            Ok(results) => interpret_results(&results),
            Err(e) => {
                tracing::error!("Judge batch failed for task={}: {}", task.id, e);
                JUDGE_FAILURES_TOTAL.inc();
                GradingOutcome {
                    verdict: Verdict::RuntimeError,
                    passed: 0,
                    total: task.test_cases.len() as u32,
                    stdout: String::new(),
                    stderr: format!("judge error: {}", e),
                }
            }
        };

        let updated = self
            .progress
            .apply_grading(&claimed.id, grading.verdict, now)
            .await?;

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            progress_id: claimed.id.clone(),
            attempt_no,
            code: code.to_string(),
            verdict: grading.verdict,
            stdout: grading.stdout,
            stderr: grading.stderr,
            passed_tests: grading.passed,
            total_tests: grading.total,
            submitted_at: now,
        };

        // The attempt trail must not be lost to a transient store error.
        let collection = self.mongo.collection::<Submission>("submissions");
        retry_async_with_config(RetryConfig::aggressive(), || async {
            collection.insert_one(&submission).await
        })
        .await
        .context("Failed to persist submission")
        .map_err(ApiError::from)?;

        SUBMISSIONS_TOTAL
            .with_label_values(&[grading.verdict.as_str()])
            .inc();

        tracing::info!(
            "Attempt {} graded {} ({}/{} passed) for student={}",
            attempt_no,
            grading.verdict.as_str(),
            submission.passed_tests,
            submission.total_tests,
            identity.student_id
        );

        Ok(SubmitOutcome::Graded {
            submission,
            progress: updated,
        })
    }
}
