//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication failed (missing or invalid token).
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request (bad JSON, bad query parameter).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Well-formed request whose content failed validation.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: serde_json::Value,
    },

    /// Queue or store cannot be reached right now.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<eventide_ingest::Error> for ApiError {
    fn from(err: eventide_ingest::Error) -> Self {
        use eventide_ingest::Error;

        match err {
            Error::InvalidBatch { rejected } => Self::Validation {
                message: format!("{} of the submitted events are invalid", rejected.len()),
                details: serde_json::to_value(&rejected).unwrap_or_default(),
            },
            Error::Validation(eventide_core::Error::InvalidEvent { problems }) => {
                Self::Validation {
                    message: "event failed validation".to_string(),
                    details: serde_json::to_value(&problems).unwrap_or_default(),
                }
            }
            Error::Validation(other) => Self::BadRequest(other.to_string()),
            other if other.is_transient() => Self::Unavailable(other.to_string()),
            other => Self::Internal(other.into()),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None, None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg), None),
            Self::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                Some(message),
                Some(details),
            ),
            Self::Unavailable(msg) => {
                tracing::warn!(error = %msg, "backend unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    Some("A backing service is unavailable, retry later".to_string()),
                    None,
                )
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("An internal error occurred".to_string()),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error,
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::FieldError;
    use eventide_ingest::RejectedEvent;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_pipeline_errors_map_by_category() {
        let batch = eventide_ingest::Error::InvalidBatch {
            rejected: vec![RejectedEvent {
                index: 2,
                source_id: "x".to_string(),
                problems: vec![FieldError::new("date", "bad")],
            }],
        };
        let ApiError::Validation { details, .. } = ApiError::from(batch) else {
            panic!("expected Validation");
        };
        assert_eq!(details[0]["index"], 2);
        assert_eq!(details[0]["problems"][0]["field"], "date");

        let down = eventide_ingest::Error::Unavailable("redis".to_string());
        assert!(matches!(ApiError::from(down), ApiError::Unavailable(_)));

        let config = eventide_ingest::Error::Config("bad".to_string());
        assert!(matches!(ApiError::from(config), ApiError::Internal(_)));
    }
}
