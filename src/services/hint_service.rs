use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use lazy_static::lazy_static;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::Database;
use regex::Regex;
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics::{HINTS_SERVED_TOTAL, HINT_FAILURES_TOTAL};
use crate::models::hint::{HintLevel, HintMessage, HintStatus};
use crate::models::progress::TaskProgress;
use crate::models::submission::Submission;
use crate::models::task::Task;
use crate::services::ai_client::{HintModel, HintModelOutput};
use crate::services::progress_service::ProgressService;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const STDERR_BRIEF_LIMIT: usize = 200;
const RECENT_ATTEMPTS_IN_SNAPSHOT: usize = 3;
const VISIBLE_TESTS_IN_SNAPSHOT: usize = 2;

lazy_static! {
    static ref CODE_BLOCK_RE: Regex = Regex::new(r"(?s)```.*?```").unwrap();
    static ref CODE_LINE_RE: Regex =
        Regex::new(r"^\s*(def |class |for |while |if |elif |else:|print\(|import |from )").unwrap();
}

pub const CODE_BLOCK_MARKER: &str = "[removed code block]";
pub const CODE_LINE_MARKER: &str = "[removed code-like line]";

/// Hard safety filter over hint text: fenced blocks are removed whole,
/// code-looking lines are replaced with a marker. Runs on every fresh
/// generation before caching or returning, independent of the provider's
/// own no-code claim.
pub fn sanitize_no_code(text: &str) -> String {
    let trimmed = text.trim();
    let without_blocks = CODE_BLOCK_RE.replace_all(trimmed, CODE_BLOCK_MARKER);

    let cleaned: Vec<&str> = without_blocks
        .lines()
        .map(|line| {
            if CODE_LINE_RE.is_match(line) {
                CODE_LINE_MARKER
            } else {
                line
            }
        })
        .collect();

    cleaned.join("\n").trim().to_string()
}

/// Availability gate: a level is callable only once the state machine has
/// stamped its unlock.
pub fn hint_gate(progress: &TaskProgress, level: HintLevel) -> Result<(), ApiError> {
    if progress.hint_unlocked(level) {
        Ok(())
    } else {
        Err(ApiError::HintNotYetAvailable)
    }
}

/// Context snapshot sent to the provider: task statement and constraints,
/// the first visible examples, the latest submission in full, and a brief
/// tail of recent attempts. `recent` is expected in ascending attempt
/// order.
pub fn build_prompt_snapshot(
    level: HintLevel,
    task: &Task,
    last_submission: Option<&Submission>,
    recent: &[Submission],
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("LEVEL={}", level.as_u8()));
    parts.push(format!("TASK_STATEMENT:\n{}", task.statement));
    if !task.constraints.is_empty() {
        parts.push(format!("CONSTRAINTS:\n{}", task.constraints));
    }

    let visible: Vec<String> = task
        .visible_test_cases()
        .take(VISIBLE_TESTS_IN_SNAPSHOT)
        .enumerate()
        .map(|(i, tc)| {
            format!(
                "Example {}:\nInput:\n{}\nOutput:\n{}",
                i + 1,
                tc.stdin,
                tc.expected_stdout
            )
        })
        .collect();
    if !visible.is_empty() {
        parts.push(format!("VISIBLE_TESTS:\n{}", visible.join("\n\n")));
    }

    if let Some(sub) = last_submission {
        parts.push(format!(
            "LAST_SUBMISSION:\nverdict={}\nstderr={}\npassed={}/{}\nCODE:\n{}",
            sub.verdict.as_str(),
            sub.stderr,
            sub.passed_tests,
            sub.total_tests,
            sub.code
        ));
    }

    if !recent.is_empty() {
        let brief: Vec<String> = recent
            .iter()
            .map(|s| {
                let err: String = s.stderr.chars().take(STDERR_BRIEF_LIMIT).collect();
                format!(
                    "attempt={} verdict={} passed={}/{} err={}",
                    s.attempt_no,
                    s.verdict.as_str(),
                    s.passed_tests,
                    s.total_tests,
                    err
                )
            })
            .collect();
        parts.push(format!("LAST_{}_ATTEMPTS_BRIEF:\n{}", RECENT_ATTEMPTS_IN_SNAPSHOT, brief.join("\n")));
    }

    parts.join("\n\n")
}

/// Gate-checked provider call: never reaches the model while the level is
/// still locked.
pub async fn generate_checked(
    model: &dyn HintModel,
    progress: &TaskProgress,
    level: HintLevel,
    prompt_snapshot: &str,
) -> Result<HintModelOutput, ApiError> {
    hint_gate(progress, level)?;

    model
        .generate(level, prompt_snapshot)
        .await
        .map_err(|e| {
            tracing::warn!(
                "Hint model failed for progress={} level={}: {}",
                progress.id,
                level.as_u8(),
                e
            );
            ApiError::ProviderUnavailable
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintSource {
    ProgressCache,
    AuditLog,
    Fresh,
}

impl HintSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HintSource::ProgressCache => "cache",
            HintSource::AuditLog => "audit",
            HintSource::Fresh => "fresh",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HintDelivery {
    pub level: HintLevel,
    pub text: String,
    pub source: HintSource,
}

/// Produces level-gated, cached, sanitized hints and keeps the audit trail
/// in hint_messages. Every generation attempt gets a row, pending rows are
/// written before the provider is called, and failures never surface
/// provider internals to the student.
pub struct HintService {
    mongo: Database,
    progress: ProgressService,
    model: Arc<dyn HintModel>,
}

impl HintService {
    pub fn new(mongo: Database, progress: ProgressService, model: Arc<dyn HintModel>) -> Self {
        Self {
            mongo,
            progress,
            model,
        }
    }

    pub async fn request_hint(
        &self,
        progress: &TaskProgress,
        task: &Task,
        level: HintLevel,
    ) -> Result<HintDelivery, ApiError> {
        hint_gate(progress, level)?;

        // 1) Denormalized fast path on the progress row.
        if let Some(text) = progress.cached_hint(level) {
            self.delivered(progress, level, HintSource::ProgressCache)
                .await?;
            return Ok(HintDelivery {
                level,
                text: text.to_string(),
                source: HintSource::ProgressCache,
            });
        }

        // 2) Durable cache: latest successful audit row for this level.
        if let Some(message) = self.latest_ok_message(&progress.id, level).await? {
            if !message.response_text.is_empty() {
                self.progress
                    .backfill_hint_text(&progress.id, level, &message.response_text)
                    .await?;
                self.delivered(progress, level, HintSource::AuditLog).await?;
                return Ok(HintDelivery {
                    level,
                    text: message.response_text,
                    source: HintSource::AuditLog,
                });
            }
        }

        // 3) Fresh generation.
        let (last_submission, recent) = self.recent_submissions(&progress.id).await?;
        let snapshot = build_prompt_snapshot(level, task, last_submission.as_ref(), &recent);

        // Audit row goes in before the call so a crash mid-call still
        // leaves a trace of what was sent.
        let message_id = self.insert_pending_message(progress, level, &snapshot).await?;

        match self.model.generate(level, &snapshot).await {
            Ok(output) if !output.text.trim().is_empty() => {
                if !output.no_code_confirmed {
                    tracing::warn!(
                        "Hint model did not confirm no-code for progress={} level={}",
                        progress.id,
                        level.as_u8()
                    );
                }

                let text = sanitize_no_code(&output.text);

                self.mark_message_ok(&message_id, &text, &output).await?;
                self.progress
                    .backfill_hint_text(&progress.id, level, &text)
                    .await?;
                self.delivered(progress, level, HintSource::Fresh).await?;

                Ok(HintDelivery {
                    level,
                    text,
                    source: HintSource::Fresh,
                })
            }
            Ok(_) => {
                self.mark_message_failed(&message_id, "empty response text")
                    .await?;
                HINT_FAILURES_TOTAL.with_label_values(&[level.as_label()]).inc();
                Err(ApiError::ProviderUnavailable)
            }
            Err(err) => {
                tracing::warn!(
                    "Hint model failed for progress={} level={}: {}",
                    progress.id,
                    level.as_u8(),
                    err
                );
                // The audit row keeps the real reason; the student only
                // ever sees the generic unavailability answer.
                self.mark_message_failed(&message_id, &err.to_string()).await?;
                HINT_FAILURES_TOTAL.with_label_values(&[level.as_label()]).inc();
                Err(ApiError::ProviderUnavailable)
            }
        }
    }

    async fn delivered(
        &self,
        progress: &TaskProgress,
        level: HintLevel,
        source: HintSource,
    ) -> Result<(), ApiError> {
        self.progress
            .increment_hint_requests(&progress.id, level)
            .await?;
        HINTS_SERVED_TOTAL
            .with_label_values(&[level.as_label(), source.as_str()])
            .inc();
        Ok(())
    }

    async fn latest_ok_message(
        &self,
        progress_id: &str,
        level: HintLevel,
    ) -> Result<Option<HintMessage>, ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(1)
            .build();

        let mut cursor = self
            .mongo
            .collection::<HintMessage>("hint_messages")
            .find(doc! {
                "progress_id": progress_id,
                "level": level.as_u8() as i32,
                "status": "ok",
            })
            .with_options(options)
            .await
            .context("Failed to query hint messages")
            .map_err(ApiError::from)?;

        cursor
            .try_next()
            .await
            .context("Hint message cursor error")
            .map_err(ApiError::from)
    }

    /// Latest submission plus up to three most recent attempts in ascending
    /// order, for the prompt snapshot.
    async fn recent_submissions(
        &self,
        progress_id: &str,
    ) -> Result<(Option<Submission>, Vec<Submission>), ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "attempt_no": -1 })
            .limit(RECENT_ATTEMPTS_IN_SNAPSHOT as i64)
            .build();

        let mut cursor = self
            .mongo
            .collection::<Submission>("submissions")
            .find(doc! { "progress_id": progress_id })
            .with_options(options)
            .await
            .context("Failed to query submissions")
            .map_err(ApiError::from)?;

        let mut recent: Vec<Submission> = Vec::new();
        while let Some(sub) = cursor
            .try_next()
            .await
            .context("Submission cursor error")
            .map_err(ApiError::from)?
        {
            recent.push(sub);
        }

        let last = recent.first().cloned();
        recent.reverse();

        Ok((last, recent))
    }

    async fn insert_pending_message(
        &self,
        progress: &TaskProgress,
        level: HintLevel,
        snapshot: &str,
    ) -> Result<String, ApiError> {
        let message = HintMessage {
            id: Uuid::new_v4().to_string(),
            progress_id: progress.id.clone(),
            level,
            prompt_snapshot: snapshot.to_string(),
            response_text: String::new(),
            model: String::new(),
            tokens_in: None,
            tokens_out: None,
            status: HintStatus::Error,
            error_message: "pending".to_string(),
            created_at: Utc::now(),
        };

        let collection = self.mongo.collection::<HintMessage>("hint_messages");
        retry_async_with_config(RetryConfig::aggressive(), || async {
            collection.insert_one(&message).await
        })
        .await
        .context("Failed to persist pending hint message")
        .map_err(ApiError::from)?;

        Ok(message.id)
    }

    async fn mark_message_ok(
        &self,
        message_id: &str,
        text: &str,
        output: &HintModelOutput,
    ) -> Result<(), ApiError> {
        self.mongo
            .collection::<HintMessage>("hint_messages")
            .update_one(
                doc! { "_id": message_id },
                doc! { "$set": {
                    "response_text": text,
                    "model": &output.model,
                    "tokens_in": output.tokens_in.map(|v| v as i64),
                    "tokens_out": output.tokens_out.map(|v| v as i64),
                    "status": "ok",
                    "error_message": "",
                }},
            )
            .await
            .context("Failed to mark hint message ok")
            .map_err(ApiError::from)?;

        Ok(())
    }

    async fn mark_message_failed(&self, message_id: &str, reason: &str) -> Result<(), ApiError> {
        self.mongo
            .collection::<HintMessage>("hint_messages")
            .update_one(
                doc! { "_id": message_id },
                doc! { "$set": {
                    "status": "error",
                    "error_message": reason,
                }},
            )
            .await
            .context("Failed to mark hint message failed")
            .map_err(ApiError::from)?;

        Ok(())
    }
}
