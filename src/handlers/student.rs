use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::extractors::AppJson;
use crate::middlewares::auth::StudentIdentity;
use crate::models::hint::HintLevel;
use crate::models::progress::TaskProgress;
use crate::models::session::{FinishReason, Session, StudentSession};
use crate::models::submission::Submission;
use crate::services::hint_service::HintService;
use crate::services::judge_client::JudgeClient;
use crate::services::progress_service::ProgressService;
use crate::services::session_service::SessionService;
use crate::services::submission_service::{SubmissionService, SubmitOutcome};
use crate::services::AppState;

#[derive(Debug, Serialize)]
pub struct ProgressSnapshot {
    pub status: crate::models::progress::ProgressStatus,
    pub attempts_total: u32,
    pub attempts_failed: u32,
    pub hint1_available: bool,
    pub hint2_available: bool,
}

impl From<&TaskProgress> for ProgressSnapshot {
    fn from(progress: &TaskProgress) -> Self {
        Self {
            status: progress.status,
            attempts_total: progress.attempts_total,
            attempts_failed: progress.attempts_failed,
            hint1_available: progress.hint_unlocked(HintLevel::One),
            hint2_available: progress.hint_unlocked(HintLevel::Two),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub id: String,
    pub attempt_no: u32,
    pub verdict: crate::models::submission::Verdict,
    pub stdout: String,
    pub stderr: String,
    pub passed_tests: u32,
    pub total_tests: u32,
}

impl From<Submission> for SubmissionView {
    fn from(sub: Submission) -> Self {
        Self {
            id: sub.id,
            attempt_no: sub.attempt_no,
            verdict: sub.verdict,
            stdout: sub.stdout,
            stderr: sub.stderr,
            passed_tests: sub.passed_tests,
            total_tests: sub.total_tests,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub starts_at: Option<chrono::DateTime<Utc>>,
    pub ends_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TaskOverview {
    pub id: String,
    pub position: u32,
    pub title: String,
    pub progress: ProgressSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    pub ok: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskOverview>>,
}

#[derive(Debug, Serialize)]
pub struct VisibleTestCase {
    pub ordinal: u32,
    pub stdin: String,
    pub expected_stdout: String,
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: String,
    pub position: u32,
    pub title: String,
    pub statement: String,
    pub constraints: String,
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    pub ok: bool,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_testcases: Option<Vec<VisibleTestCase>>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct FinishSessionRequest {
    pub reason: Option<FinishReason>,
}

fn session_service(state: &AppState) -> SessionService {
    SessionService::new(state.mongo.clone())
}

fn progress_service(state: &AppState) -> ProgressService {
    ProgressService::new(state.mongo.clone(), state.redis.clone())
}

fn submission_service(state: &AppState) -> SubmissionService {
    SubmissionService::new(
        state.mongo.clone(),
        session_service(state),
        progress_service(state),
        JudgeClient::from_config(state.judge_transport.clone(), &state.config.judge),
        state.config.submit_cooldown_seconds,
    )
}

fn hint_service(state: &AppState) -> HintService {
    HintService::new(
        state.mongo.clone(),
        progress_service(state),
        state.hint_model.clone(),
    )
}

/// Resolves the student's active session and touches the per-pair
/// StudentSession row. Shared by the task-scoped handlers.
async fn resolve_active_context(
    state: &AppState,
    identity: &StudentIdentity,
) -> Result<(Session, StudentSession), ApiError> {
    let now = Utc::now();

    let session = session_service(state)
        .active_session_for_class(&identity.class_group_id, now)
        .await?
        .ok_or(ApiError::SessionInactive)?;

    let student_session = progress_service(state)
        .get_or_create_student_session(&identity.student_id, &session.id, now)
        .await?;

    if student_session.is_finished() {
        return Err(ApiError::SessionInactive);
    }

    Ok((session, student_session))
}

/// GET /api/student/active-session
pub async fn active_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
) -> Result<Json<ActiveSessionResponse>, ApiError> {
    let now = Utc::now();
    let sessions = session_service(&state);

    let Some(session) = sessions
        .active_session_for_class(&identity.class_group_id, now)
        .await?
    else {
        return Ok(Json(ActiveSessionResponse {
            ok: true,
            active: false,
            message: Some("Current session is inactive".to_string()),
            session: None,
            tasks: None,
        }));
    };

    let progress = progress_service(&state);
    let student_session = progress
        .get_or_create_student_session(&identity.student_id, &session.id, now)
        .await?;

    let tasks = sessions.list_tasks(&session.id).await?;
    let progress_map = progress.progress_by_task(&student_session.id).await?;

    let tasks_out: Vec<TaskOverview> = tasks
        .into_iter()
        .map(|task| {
            let snapshot = progress_map
                .get(&task.id)
                .map(ProgressSnapshot::from)
                .unwrap_or(ProgressSnapshot {
                    status: crate::models::progress::ProgressStatus::NotStarted,
                    attempts_total: 0,
                    attempts_failed: 0,
                    hint1_available: false,
                    hint2_available: false,
                });
            TaskOverview {
                id: task.id,
                position: task.position,
                title: task.title,
                progress: snapshot,
            }
        })
        .collect();

    Ok(Json(ActiveSessionResponse {
        ok: true,
        active: true,
        message: None,
        session: Some(SessionInfo {
            id: session.id,
            title: session.title,
            description: session.description,
            starts_at: session.starts_at,
            ends_at: session.ends_at,
        }),
        tasks: Some(tasks_out),
    }))
}

/// GET /api/student/tasks/{task_id}
///
/// First open creates the progress row and stamps opened_at; solved+locked
/// tasks answer with locked=true and hide the statement.
pub async fn task_detail(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDetailResponse>, ApiError> {
    let now = Utc::now();
    let (session, student_session) = resolve_active_context(&state, &identity).await?;

    let task = session_service(&state)
        .find_task_in_session(&task_id, &session.id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;

    let progress_svc = progress_service(&state);
    let mut progress = progress_svc
        .get_or_create_progress(&student_session.id, &task.id)
        .await?;

    if progress.mark_opened(now) {
        progress_svc.persist_opened(&progress.id, now).await?;
    }

    if progress.is_locked() {
        return Ok(Json(TaskDetailResponse {
            ok: true,
            locked: true,
            message: Some("Task already solved and is no longer viewable".to_string()),
            task: None,
            progress: None,
            visible_testcases: None,
        }));
    }

    let visible: Vec<VisibleTestCase> = task
        .visible_test_cases()
        .map(|tc| VisibleTestCase {
            ordinal: tc.ordinal,
            stdin: tc.stdin.clone(),
            expected_stdout: tc.expected_stdout.clone(),
        })
        .collect();

    Ok(Json(TaskDetailResponse {
        ok: true,
        locked: false,
        message: None,
        task: Some(TaskView {
            id: task.id.clone(),
            position: task.position,
            title: task.title.clone(),
            statement: task.statement.clone(),
            constraints: task.constraints.clone(),
        }),
        progress: Some(ProgressSnapshot::from(&progress)),
        visible_testcases: Some(visible),
    }))
}

/// POST /api/student/tasks/{task_id}/submit
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
    Path(task_id): Path<String>,
    AppJson(req): AppJson<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let service = submission_service(&state);

    match service.submit(&identity, &task_id, &req.code).await? {
        SubmitOutcome::Locked => Ok(Json(SubmitResponse {
            ok: true,
            locked: true,
            message: Some("Task already solved".to_string()),
            submission: None,
            progress: None,
        })),
        SubmitOutcome::Graded {
            submission,
            progress,
        } => Ok(Json(SubmitResponse {
            ok: true,
            locked: false,
            message: None,
            submission: Some(SubmissionView::from(submission)),
            progress: Some(ProgressSnapshot::from(&progress)),
        })),
    }
}

/// POST /api/student/tasks/{task_id}/hints/{level}
pub async fn request_hint(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
    Path((task_id, level)): Path<(String, u8)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let level = HintLevel::try_from(level).map_err(ApiError::BadRequest)?;

    let (session, student_session) = resolve_active_context(&state, &identity).await?;

    let task = session_service(&state)
        .find_task_in_session(&task_id, &session.id)
        .await?
        .ok_or_else(|| ApiError::not_found("task not found"))?;

    let progress = progress_service(&state)
        .get_or_create_progress(&student_session.id, &task.id)
        .await?;

    let delivery = hint_service(&state)
        .request_hint(&progress, &task, level)
        .await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "level": delivery.level.as_u8(),
        "text": delivery.text,
    })))
}

/// POST /api/student/finish-session
pub async fn finish_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
    AppJson(req): AppJson<FinishSessionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();

    // Resolved without the finished check: repeat finishes answer with
    // finished=false instead of an error.
    let session = session_service(&state)
        .active_session_for_class(&identity.class_group_id, now)
        .await?
        .ok_or(ApiError::SessionInactive)?;
    let student_session = progress_service(&state)
        .get_or_create_student_session(&identity.student_id, &session.id, now)
        .await?;

    let reason = req.reason.unwrap_or(FinishReason::Manual);
    let finished = session_service(&state)
        .finish_student_session(&student_session.id, reason, now)
        .await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "finished": finished,
    })))
}
