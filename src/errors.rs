use crate::services::{build_tracker::TrackerError, publisher::PublishError};
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

const INTERNAL_MESSAGE: &str = "internal server error";

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Log `err` and answer with a generic 500.
    pub fn internal(err: impl fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing or invalid bearer token")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Validation(_) => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            TrackerError::ConcurrencyLimit { .. } | TrackerError::QuotaExceeded { .. } => {
                AppError::new(StatusCode::TOO_MANY_REQUESTS, err.to_string())
            }
            TrackerError::NotFound(_) => AppError::not_found(err.to_string()),
            TrackerError::InvalidTransition { .. }
            | TrackerError::Corrupt(_)
            | TrackerError::Sqlx(_) => AppError::internal(err),
        }
    }
}

impl From<PublishError> for AppError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::InvalidKey(_) | PublishError::NotFound(_) => {
                AppError::not_found("not found")
            }
            other => AppError::internal(other),
        }
    }
}

/// Malformed JSON keeps axum's status: 400 for syntax errors, 422 for
/// missing or mistyped fields, 415 for a wrong content type.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

/// Unparseable query strings are a plain 400.
impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::build::BuildStatus;
    use uuid::Uuid;

    #[test]
    fn tracker_errors_map_to_statuses() {
        let cases = [
            (
                TrackerError::Validation("user_id is required".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                TrackerError::ConcurrencyLimit {
                    user_id: "u1".into(),
                    limit: 10,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                TrackerError::QuotaExceeded {
                    user_id: "u1".into(),
                    limit: 100,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                TrackerError::NotFound("build `x`".into()),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_failures_hide_details() {
        let err = AppError::from(TrackerError::InvalidTransition {
            build_id: Uuid::nil(),
            from: BuildStatus::Complete,
            to: BuildStatus::Error,
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, INTERNAL_MESSAGE);

        let err = AppError::from(PublishError::Io(std::io::Error::other("/var/secret")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("secret"));
    }
}
