use anyhow::{Context, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use mongodb::bson::doc;
use mongodb::Database;
use regex::Regex;

use crate::error::ApiError;
use crate::middlewares::auth::{JwtService, StudentClaims};
use crate::models::student::{ClassGroup, Student};

const TOKEN_TTL_SECONDS: i64 = 8 * 3600;

lazy_static! {
    static ref PIN_RE: Regex = Regex::new(r"^\d{6}$").unwrap();
}

/// Student profile returned after login / identity lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StudentProfile {
    pub id: String,
    pub full_name: String,
    pub class_group_id: String,
    pub class_group_name: String,
}

/// Name+PIN login for students. Only the bcrypt hash of the PIN is stored;
/// lookup is case-insensitive via the normalized name key.
pub struct AuthService {
    mongo: Database,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(mongo: Database, jwt: JwtService) -> Self {
        Self { mongo, jwt }
    }

    pub async fn login(&self, full_name: &str, pin: &str) -> Result<(StudentProfile, String), ApiError> {
        let full_name = full_name.trim();
        let pin = pin.trim();

        if full_name.is_empty() || pin.is_empty() {
            return Err(ApiError::bad_request("full_name and pin are required"));
        }
        if !PIN_RE.is_match(pin) {
            return Err(ApiError::bad_request("pin must be 6 digits"));
        }

        let student = self
            .find_active_student(full_name)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::not_found("student not found"))?;

        let pin_ok = bcrypt::verify(pin, &student.pin_hash)
            .context("Failed to verify PIN")
            .map_err(ApiError::from)?;
        if !pin_ok {
            return Err(ApiError::Unauthenticated);
        }

        let profile = self.profile_for(&student).await.map_err(ApiError::from)?;

        let now = Utc::now().timestamp();
        let claims = StudentClaims {
            sub: student.id.clone(),
            class_group_id: student.class_group_id.clone(),
            exp: (now + TOKEN_TTL_SECONDS) as usize,
            iat: now as usize,
        };
        let token = self
            .jwt
            .generate_token(claims)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("token generation failed: {}", e)))?;

        tracing::info!(
            "Student logged in: {} (class: {})",
            student.id,
            student.class_group_id
        );

        Ok((profile, token))
    }

    /// Profile for an already-authenticated student id; used by the
    /// identity endpoint.
    pub async fn current_student(&self, student_id: &str) -> Result<StudentProfile, ApiError> {
        let student = self
            .mongo
            .collection::<Student>("students")
            .find_one(doc! { "_id": student_id, "is_active": true })
            .await
            .context("Failed to load student")
            .map_err(ApiError::from)?
            .ok_or(ApiError::Unauthenticated)?;

        self.profile_for(&student).await.map_err(ApiError::from)
    }

    async fn find_active_student(&self, full_name: &str) -> Result<Option<Student>> {
        self.mongo
            .collection::<Student>("students")
            .find_one(doc! {
                "name_key": Student::name_key_for(full_name),
                "is_active": true,
            })
            .await
            .context("Failed to query students")
    }

    async fn profile_for(&self, student: &Student) -> Result<StudentProfile> {
        let class_group = self
            .mongo
            .collection::<ClassGroup>("class_groups")
            .find_one(doc! { "_id": &student.class_group_id })
            .await
            .context("Failed to load class group")?;

        Ok(StudentProfile {
            id: student.id.clone(),
            full_name: student.full_name.clone(),
            class_group_id: student.class_group_id.clone(),
            class_group_name: class_group.map(|g| g.name).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_format_is_six_digits() {
        assert!(PIN_RE.is_match("123456"));
        assert!(!PIN_RE.is_match("12345"));
        assert!(!PIN_RE.is_match("1234567"));
        assert!(!PIN_RE.is_match("12a456"));
        assert!(!PIN_RE.is_match(""));
    }
}
