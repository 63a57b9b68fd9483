use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain error surface for the student API. Every variant maps to one of
/// the logical response codes clients are expected to branch on; transport
/// and store errors from collaborators are wrapped into `Internal` and
/// never leak their own messages past the log line.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("current session is inactive")]
    SessionInactive,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("too frequent submits, wait {wait_seconds}s")]
    TooFrequent { wait_seconds: i64 },
    #[error("no changes in code since last submit")]
    NoCodeChange,
    #[error("hint level not available yet")]
    HintNotYetAvailable,
    #[error("assistant temporarily unavailable")]
    ProviderUnavailable,
    #[error("server configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Stable machine-readable code, independent of the human message.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::SessionInactive => "session-inactive",
            ApiError::NotFound(_) => "not-found",
            ApiError::BadRequest(_) => "bad-request",
            ApiError::TooFrequent { .. } => "too-frequent",
            ApiError::NoCodeChange => "no-code-change",
            ApiError::HintNotYetAvailable => "hint-not-yet-available",
            ApiError::ProviderUnavailable => "provider-unavailable",
            ApiError::Config(_) => "config-error",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::SessionInactive => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TooFrequent { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NoCodeChange => StatusCode::BAD_REQUEST,
            ApiError::HintNotYetAvailable => StatusCode::FORBIDDEN,
            ApiError::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            // Do not echo internal/store details to clients.
            ApiError::Internal(err) => {
                tracing::error!("internal error: {:#}", err);
                "internal server error".to_string()
            }
            ApiError::Config(reason) => {
                tracing::error!("configuration error: {}", reason);
                "server configuration error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "ok": false,
            "code": self.code(),
            "error": message,
        });

        if let ApiError::TooFrequent { wait_seconds } = &self {
            body["wait_seconds"] = json!(wait_seconds);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ApiError::Unauthenticated.code(), "unauthenticated");
        assert_eq!(ApiError::TooFrequent { wait_seconds: 7 }.code(), "too-frequent");
        assert_eq!(ApiError::NoCodeChange.code(), "no-code-change");
        assert_eq!(ApiError::HintNotYetAvailable.code(), "hint-not-yet-available");
        assert_eq!(ApiError::ProviderUnavailable.code(), "provider-unavailable");
    }
}
