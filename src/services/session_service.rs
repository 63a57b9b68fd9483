use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson};
use mongodb::options::FindOptions;
use mongodb::Database;

use crate::models::session::{FinishReason, Session};
use crate::models::task::Task;
use crate::utils::time::bson_datetime;

/// Resolves the exam session a class group is currently allowed to work
/// in and loads its tasks. Session and task rows are instructor data; this
/// service only reads them.
pub struct SessionService {
    mongo: Database,
}

impl SessionService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// The most recently started running session the class may access, if
    /// it is active right now. Scheduling windows are enforced here, not at
    /// query level, so a stale status field cannot widen access.
    pub async fn active_session_for_class(
        &self,
        class_group_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let collection = self.mongo.collection::<Session>("sessions");

        let options = FindOptions::builder()
            .sort(doc! { "starts_at": -1, "created_at": -1 })
            .limit(5)
            .build();

        let mut cursor = collection
            .find(doc! { "status": "running", "allowed_class_ids": class_group_id })
            .with_options(options)
            .await
            .context("Failed to query running sessions")?;

        while let Some(session) = cursor.try_next().await.context("Session cursor error")? {
            if session.is_active_now(now) {
                return Ok(Some(session));
            }
        }

        Ok(None)
    }

    /// A task by id, constrained to the given session so students cannot
    /// reach tasks of other sessions by guessing ids.
    pub async fn find_task_in_session(
        &self,
        task_id: &str,
        session_id: &str,
    ) -> Result<Option<Task>> {
        self.mongo
            .collection::<Task>("tasks")
            .find_one(doc! { "_id": task_id, "session_id": session_id })
            .await
            .context("Failed to load task")
    }

    /// All tasks of a session in menu order.
    pub async fn list_tasks(&self, session_id: &str) -> Result<Vec<Task>> {
        let options = FindOptions::builder().sort(doc! { "position": 1 }).build();

        let mut cursor = self
            .mongo
            .collection::<Task>("tasks")
            .find(doc! { "session_id": session_id })
            .with_options(options)
            .await
            .context("Failed to query session tasks")?;

        let mut tasks = Vec::new();
        while let Some(task) = cursor.try_next().await.context("Task cursor error")? {
            tasks.push(task);
        }

        Ok(tasks)
    }

    /// Stamps finished_at/finish_reason once; repeat calls are no-ops.
    /// Returns whether this call did the stamping.
    pub async fn finish_student_session(
        &self,
        student_session_id: &str,
        reason: FinishReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = self
            .mongo
            .collection::<crate::models::session::StudentSession>("student_sessions")
            .update_one(
                doc! { "_id": student_session_id, "finished_at": Bson::Null },
                doc! { "$set": {
                    "finished_at": bson_datetime(now),
                    "finish_reason": mongodb::bson::to_bson(&reason)
                        .context("Failed to encode finish reason")?,
                }},
            )
            .await
            .context("Failed to finish student session")?;

        Ok(result.modified_count > 0)
    }
}
