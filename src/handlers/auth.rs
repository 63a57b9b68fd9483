use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::extractors::AppJson;
use crate::middlewares::auth::{JwtService, StudentIdentity};
use crate::services::auth_service::AuthService;
use crate::services::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct StudentLoginRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 6, max = 6))]
    pub pin: String,
}

/// POST /api/auth/student-login
pub async fn student_login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StudentLoginRequest>,
) -> Result<Json<Value>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let service = AuthService::new(
        state.mongo.clone(),
        JwtService::new(&state.config.jwt_secret),
    );

    let (student, token) = service.login(&req.full_name, &req.pin).await?;

    Ok(Json(json!({
        "ok": true,
        "student": student,
        "token": token,
    })))
}

/// GET /api/auth/student-me
pub async fn student_me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<StudentIdentity>,
) -> Result<Json<Value>, ApiError> {
    let service = AuthService::new(
        state.mongo.clone(),
        JwtService::new(&state.config.jwt_secret),
    );

    let student = service.current_student(&identity.student_id).await?;

    Ok(Json(json!({
        "ok": true,
        "student": student,
    })))
}
