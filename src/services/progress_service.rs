use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_document, Bson};
use mongodb::options::ReturnDocument;
use mongodb::Database;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::models::hint::HintLevel;
use crate::models::progress::{ProgressStatus, TaskProgress, HINT_LEVEL1_THRESHOLD, HINT_LEVEL2_THRESHOLD};
use crate::models::session::StudentSession;
use crate::models::submission::Verdict;
use crate::utils::time::bson_datetime;

const SUBMIT_LOCK_TTL_MS: u64 = 10_000;
const SUBMIT_LOCK_ATTEMPTS: usize = 5;
const SUBMIT_LOCK_RETRY_MS: u64 = 100;

/// Token-checked lock over one progress row. Held only for the
/// gate-check-then-claim critical section, never across the judge call.
pub struct ProgressLock {
    key: String,
    token: String,
}

/// Owns persistence of StudentSession and TaskProgress rows: unique-pair
/// get-or-create upserts, the per-progress submit lock, and the atomic
/// counter updates the state machine decides on.
pub struct ProgressService {
    mongo: Database,
    redis: ConnectionManager,
}

impl ProgressService {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    /// Get-or-create on the unique (student, session) pair; always touches
    /// last_seen_at.
    pub async fn get_or_create_student_session(
        &self,
        student_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StudentSession> {
        let collection = self.mongo.collection::<StudentSession>("student_sessions");

        let update = doc! {
            "$set": { "last_seen_at": bson_datetime(now) },
            "$setOnInsert": {
                "_id": Uuid::new_v4().to_string(),
                "started_at": bson_datetime(now),
                "finished_at": Bson::Null,
                "finish_reason": Bson::Null,
            },
        };

        collection
            .find_one_and_update(
                doc! { "student_id": student_id, "session_id": session_id },
                update,
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to upsert student session")?
            .ok_or_else(|| anyhow::anyhow!("Student session upsert returned no document"))
    }

    /// Get-or-create on the unique (student_session, task) pair. The new
    /// row starts in NOT_STARTED with zeroed counters.
    pub async fn get_or_create_progress(
        &self,
        student_session_id: &str,
        task_id: &str,
    ) -> Result<TaskProgress> {
        let collection = self.mongo.collection::<TaskProgress>("task_progress");

        let template = TaskProgress::new(
            Uuid::new_v4().to_string(),
            student_session_id,
            task_id,
        );
        let mut on_insert = to_document(&template).context("Failed to encode progress template")?;
        // The filter's equality keys are added by the upsert itself.
        on_insert.remove("student_session_id");
        on_insert.remove("task_id");

        collection
            .find_one_and_update(
                doc! { "student_session_id": student_session_id, "task_id": task_id },
                doc! { "$setOnInsert": on_insert },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to upsert task progress")?
            .ok_or_else(|| anyhow::anyhow!("Task progress upsert returned no document"))
    }

    pub async fn find_progress(&self, progress_id: &str) -> Result<Option<TaskProgress>> {
        self.mongo
            .collection::<TaskProgress>("task_progress")
            .find_one(doc! { "_id": progress_id })
            .await
            .context("Failed to load task progress")
    }

    /// Persist the set-once side of mark_opened. The filters make repeats
    /// no-ops, so the idempotency of the pure transition survives races.
    pub async fn persist_opened(&self, progress_id: &str, now: DateTime<Utc>) -> Result<()> {
        let collection = self.mongo.collection::<TaskProgress>("task_progress");

        collection
            .update_one(
                doc! { "_id": progress_id, "opened_at": Bson::Null },
                doc! { "$set": { "opened_at": bson_datetime(now) } },
            )
            .await
            .context("Failed to stamp opened_at")?;

        collection
            .update_one(
                doc! { "_id": progress_id, "status": "not_started" },
                doc! { "$set": { "status": "in_progress" } },
            )
            .await
            .context("Failed to move progress to in_progress")?;

        Ok(())
    }

    /// Acquire the submit lock for one progress row. Returns None when the
    /// lock stays contended after a few short retries, which callers report
    /// as a too-frequent rejection rather than blocking the request.
    pub async fn acquire_submit_lock(&self, progress_id: &str) -> Result<Option<ProgressLock>> {
        let mut conn = self.redis.clone();
        let key = format!("progress:submit-lock:{}", progress_id);
        let token = Uuid::new_v4().to_string();

        for attempt in 0..SUBMIT_LOCK_ATTEMPTS {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(SUBMIT_LOCK_TTL_MS)
                .query_async(&mut conn)
                .await
                .context("Failed to acquire submit lock")?;

            if acquired.is_some() {
                return Ok(Some(ProgressLock { key, token }));
            }
            if attempt + 1 < SUBMIT_LOCK_ATTEMPTS {
                tokio::time::sleep(std::time::Duration::from_millis(SUBMIT_LOCK_RETRY_MS)).await;
            }
        }

        tracing::warn!("Submit lock contended for progress={}", progress_id);
        Ok(None)
    }

    /// Compare-and-delete release so an expired lock taken over by another
    /// request is never deleted from under it.
    pub async fn release_submit_lock(&self, lock: ProgressLock) -> Result<()> {
        let mut conn = self.redis.clone();

        let lua_script = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
        "#;

        let _: i64 = redis::Script::new(lua_script)
            .key(&lock.key)
            .arg(&lock.token)
            .invoke_async(&mut conn)
            .await
            .context("Failed to release submit lock")?;

        Ok(())
    }

    /// Claims the next attempt number and stamps the anti-spam marks in one
    /// atomic update. Must run under the submit lock, after the gates
    /// passed on a fresh read. Returns the row as of after the claim, so
    /// attempt_no == attempts_total.
    pub async fn claim_attempt(
        &self,
        fresh: &TaskProgress,
        now: DateTime<Utc>,
        code_hash: &str,
    ) -> Result<TaskProgress> {
        let collection = self.mongo.collection::<TaskProgress>("task_progress");

        let mut set = doc! {
            "last_submit_at": bson_datetime(now),
            "last_code_hash": code_hash,
        };
        if fresh.opened_at.is_none() {
            set.insert("opened_at", bson_datetime(now));
        }
        if fresh.status == ProgressStatus::NotStarted {
            set.insert("status", "in_progress");
        }

        collection
            .find_one_and_update(
                doc! { "_id": &fresh.id },
                doc! { "$inc": { "attempts_total": 1 }, "$set": set },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to claim attempt")?
            .ok_or_else(|| anyhow::anyhow!("Progress {} vanished while claiming attempt", fresh.id))
    }

    /// Applies a graded verdict: accepted solves and locks; anything else
    /// counts a failure and stamps the hint unlocks the first time the
    /// thresholds are reached.
    pub async fn apply_grading(
        &self,
        progress_id: &str,
        verdict: Verdict,
        now: DateTime<Utc>,
    ) -> Result<TaskProgress> {
        let collection = self.mongo.collection::<TaskProgress>("task_progress");

        if verdict.is_accepted() {
            return collection
                .find_one_and_update(
                    doc! { "_id": progress_id },
                    doc! { "$set": {
                        "status": "solved",
                        "solved_at": bson_datetime(now),
                        "locked_after_solve": true,
                    }},
                )
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to mark progress solved")?
                .ok_or_else(|| anyhow::anyhow!("Progress {} vanished while solving", progress_id));
        }

        let mut updated = collection
            .find_one_and_update(
                doc! { "_id": progress_id },
                doc! { "$inc": { "attempts_failed": 1 } },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to count failed attempt")?
            .ok_or_else(|| anyhow::anyhow!("Progress {} vanished while grading", progress_id))?;

        // Write-once unlock stamps; the filter keeps concurrent stampers
        // from overwriting the first one.
        if updated.attempts_failed >= HINT_LEVEL1_THRESHOLD && updated.hint1_unlocked_at.is_none() {
            collection
                .update_one(
                    doc! { "_id": progress_id, "hint1_unlocked_at": Bson::Null },
                    doc! { "$set": { "hint1_unlocked_at": bson_datetime(now) } },
                )
                .await
                .context("Failed to stamp hint level 1 unlock")?;
            updated.hint1_unlocked_at = Some(now);
        }
        if updated.attempts_failed >= HINT_LEVEL2_THRESHOLD && updated.hint2_unlocked_at.is_none() {
            collection
                .update_one(
                    doc! { "_id": progress_id, "hint2_unlocked_at": Bson::Null },
                    doc! { "$set": { "hint2_unlocked_at": bson_datetime(now) } },
                )
                .await
                .context("Failed to stamp hint level 2 unlock")?;
            updated.hint2_unlocked_at = Some(now);
        }

        Ok(updated)
    }

    /// Server-side delivery counter; bumped on every hint handed to the
    /// student, cached or fresh.
    pub async fn increment_hint_requests(
        &self,
        progress_id: &str,
        level: HintLevel,
    ) -> Result<()> {
        let field = match level {
            HintLevel::One => "hint1_requests",
            HintLevel::Two => "hint2_requests",
        };

        self.mongo
            .collection::<TaskProgress>("task_progress")
            .update_one(doc! { "_id": progress_id }, doc! { "$inc": { field: 1 } })
            .await
            .context("Failed to increment hint request counter")?;

        Ok(())
    }

    /// Write-once backfill of the denormalized hint text mirror.
    pub async fn backfill_hint_text(
        &self,
        progress_id: &str,
        level: HintLevel,
        text: &str,
    ) -> Result<()> {
        let field = match level {
            HintLevel::One => "hint1_text",
            HintLevel::Two => "hint2_text",
        };

        self.mongo
            .collection::<TaskProgress>("task_progress")
            .update_one(
                doc! { "_id": progress_id, field: "" },
                doc! { "$set": { field: text } },
            )
            .await
            .context("Failed to backfill hint text cache")?;

        Ok(())
    }

    /// Progress rows for one student session, keyed by task.
    pub async fn progress_by_task(
        &self,
        student_session_id: &str,
    ) -> Result<std::collections::HashMap<String, TaskProgress>> {
        use futures::TryStreamExt;

        let mut cursor = self
            .mongo
            .collection::<TaskProgress>("task_progress")
            .find(doc! { "student_session_id": student_session_id })
            .await
            .context("Failed to query progress rows")?;

        let mut map = std::collections::HashMap::new();
        while let Some(progress) = cursor
            .try_next()
            .await
            .context("Progress cursor error")?
        {
            map.insert(progress.task_id.clone(), progress);
        }

        Ok(map)
    }
}
