//! HTTP error responses.
//!
//! Maps [`BookingError`] kinds onto status codes and a stable JSON body:
//!
//! | Kind | Status |
//! |---|---|
//! | `VALIDATION_ERROR` | 422 |
//! | `CAPACITY_EXCEEDED` | 409 |
//! | `CONFLICT` | 409 |
//! | `NOT_FOUND` | 404 |
//! | `TOKEN_ERROR` | 403 |
//! | `USAGE_LIMIT` | 409 |
//! | `STORAGE_ERROR` | 500 |

use crate::error::{BookingError, ErrorKind};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Error returned by every handler.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Structured detail: offending fields, remaining capacity
    details: Option<Value>,
    /// Underlying cause, logged but never rendered
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// HTTP status this error renders with
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::CapacityExceeded | ErrorKind::Conflict | ErrorKind::UsageLimit => {
            StatusCode::CONFLICT
        },
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Token => StatusCode::FORBIDDEN,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        let kind = error.kind();
        let status = status_for(kind);

        // Storage detail stays in the log.
        let message = if kind == ErrorKind::Storage {
            "An internal error occurred".to_string()
        } else {
            error.to_string()
        };

        let details = match &error {
            BookingError::Validation(errors) => Some(json!({
                "fields": errors
                    .errors()
                    .iter()
                    .map(|e| json!({ "field": e.field, "message": e.message }))
                    .collect::<Vec<_>>(),
            })),
            BookingError::CapacityExceeded {
                remaining,
                waitlist_open,
                ..
            } => Some(json!({ "remaining": remaining, "waitlist_open": waitlist_open })),
            BookingError::InvalidTransition { from, to } => {
                Some(json!({ "from": from, "to": to }))
            },
            BookingError::UsageLimit { scope, limit } => {
                Some(json!({ "scope": scope, "limit": limit }))
            },
            _ => None,
        };

        let source = (kind == ErrorKind::Storage).then(|| anyhow::Error::new(error));

        Self {
            status,
            message,
            code: kind.code(),
            details,
            source,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use crate::types::BookingStatus;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BookingError::invalid("customer_email", "is required"), 422),
            (
                BookingError::CapacityExceeded {
                    remaining: Some(0),
                    reason: "Sold out".into(),
                    waitlist_open: false,
                },
                409,
            ),
            (
                BookingError::InvalidTransition {
                    from: BookingStatus::CheckedIn,
                    to: BookingStatus::Cancelled,
                },
                409,
            ),
            (BookingError::not_found("booking", "ABCD2345"), 404),
            (BookingError::Token(TokenError::Mismatch), 403),
            (
                BookingError::UsageLimit {
                    scope: "global",
                    limit: 3,
                },
                409,
            ),
            (BookingError::Storage("connection reset".into()), 500),
        ];
        for (error, status) in cases {
            assert_eq!(AppError::from(error).status().as_u16(), status);
        }
    }

    #[test]
    fn test_storage_detail_is_hidden() {
        let err = AppError::from(BookingError::Storage("password=hunter2".into()));
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(!err.to_string().contains("hunter2"));
        assert!(err.source.is_some_and(|s| s.to_string().contains("hunter2")));
    }

    #[test]
    fn test_anyhow_errors_are_internal() {
        let err = AppError::from(anyhow::anyhow!("pool closed"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("pool closed"));
    }

    #[test]
    fn test_display() {
        let err = AppError::from(BookingError::not_found("booking", "ABCD2345"));
        assert_eq!(err.to_string(), format!("[NOT_FOUND] {}", BookingError::not_found("booking", "ABCD2345")));
    }
}
