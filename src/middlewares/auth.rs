use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StudentClaims {
    pub sub: String,            // student_id
    pub class_group_id: String, // class the student belongs to
    pub exp: usize,             // expiration timestamp
    pub iat: usize,             // issued at timestamp
}

/// Request-scoped identity of the authenticated student. Handlers receive
/// this as an extension and pass it into every core operation explicitly;
/// nothing in the core reads identity from ambient state.
#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub student_id: String,
    pub class_group_id: String,
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: StudentClaims) -> Result<String, AuthError> {
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<StudentClaims, AuthError> {
        let validation = Validation::default();

        decode::<StudentClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                if e.to_string().contains("ExpiredSignature") {
                    AuthError::ExpiredToken
                } else if e.to_string().contains("InvalidSignature") {
                    AuthError::InvalidSignature
                } else {
                    AuthError::InvalidToken
                }
            })
    }
}

/// Bearer-token middleware for the student API.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Extract token from Authorization header
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    tracing::debug!(
        "Authenticated student: {} (class: {})",
        claims.sub,
        claims.class_group_id
    );

    let identity = StudentIdentity {
        student_id: claims.sub.clone(),
        class_group_id: claims.class_group_id.clone(),
    };

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_claims() {
        let jwt = JwtService::new("test-secret");
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = StudentClaims {
            sub: "student-1".to_string(),
            class_group_id: "7a".to_string(),
            exp: now + 3600,
            iat: now,
        };

        let token = jwt.generate_token(claims.clone()).unwrap();
        let decoded = jwt.validate_token(&token).unwrap();

        assert_eq!(decoded.sub, "student-1");
        assert_eq!(decoded.class_group_id, "7a");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let jwt = JwtService::new("test-secret");
        let now = chrono::Utc::now().timestamp() as usize;
        let token = jwt
            .generate_token(StudentClaims {
                sub: "student-1".to_string(),
                class_group_id: "7a".to_string(),
                exp: now + 3600,
                iat: now,
            })
            .unwrap();

        let other = JwtService::new("other-secret");
        assert!(other.validate_token(&token).is_err());
    }
}
