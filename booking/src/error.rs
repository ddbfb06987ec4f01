//! Error types for booking, waitlist, verification and usage operations.

use crate::types::BookingStatus;
use std::fmt;
use thiserror::Error;

/// Result type alias for booking operations.
pub type Result<T> = std::result::Result<T, BookingError>;

/// Coarse error classification shared by every transport.
///
/// Each [`BookingError`] variant belongs to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed input; do not retry
    Validation,
    /// Admission denied
    CapacityExceeded,
    /// Illegal lifecycle transition
    Conflict,
    /// Unknown id or code
    NotFound,
    /// Cancel-token mismatch or expiry
    Token,
    /// Coupon or pass ceiling reached
    UsageLimit,
    /// Transaction or commit failure; safe to retry
    Storage,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Token => "TOKEN_ERROR",
            Self::UsageLimit => "USAGE_LIMIT",
            Self::Storage => "STORAGE_ERROR",
        }
    }
}

/// One offending input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field name as the caller spelled it
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

/// Every problem found while validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// An empty collection
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Records a problem with `field`.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Single-field shorthand.
    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// `true` when nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Recorded problems, in the order they were found
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether `field` was flagged
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when empty, otherwise a [`BookingError::Validation`].
    ///
    /// # Errors
    ///
    /// Returns the collected errors if any were recorded.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BookingError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

/// Why a cancel token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The presented token is not the booking's token.
    #[error("cancel token does not match")]
    Mismatch,

    /// The token's expiry has passed.
    #[error("cancel token has expired")]
    Expired,
}

/// Errors returned by every public booking operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    // ═══════════════════════════════════════════════════════════
    // Caller errors
    // ═══════════════════════════════════════════════════════════
    /// One or more request fields are missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Admission was denied at the element, category or event level.
    #[error("{reason}")]
    CapacityExceeded {
        /// Units left at the level that refused, if known
        remaining: Option<u32>,
        /// Human-readable reason
        reason: String,
        /// Whether the caller may join the waitlist instead
        waitlist_open: bool,
    },

    // ═══════════════════════════════════════════════════════════
    // Lifecycle conflicts
    // ═══════════════════════════════════════════════════════════
    /// The transition table forbids this move.
    #[error("Cannot transition booking from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: BookingStatus,
        /// Attempted status
        to: BookingStatus,
    },

    /// The booking is already cancelled.
    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    /// Any other lifecycle or uniqueness conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    // ═══════════════════════════════════════════════════════════
    // Lookup and authorization
    // ═══════════════════════════════════════════════════════════
    /// No record with that id or code.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record looked up
        resource: &'static str,
        /// The id or code that missed
        id: String,
    },

    /// Cancel token refused.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A coupon or pass ceiling would be exceeded.
    #[error("Usage limit of {limit} reached ({scope})")]
    UsageLimit {
        /// `"global"` or `"per_user"`
        scope: &'static str,
        /// The ceiling that was hit
        limit: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // System
    // ═══════════════════════════════════════════════════════════
    /// The store failed to read or commit.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Shorthand for a [`BookingError::NotFound`].
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Shorthand for a single-field [`BookingError::Validation`].
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }

    /// The taxonomy bucket this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InvalidTransition { .. } | Self::AlreadyCancelled | Self::Conflict(_) => {
                ErrorKind::Conflict
            },
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Token(_) => ErrorKind::Token,
            Self::UsageLimit { .. } => ErrorKind::UsageLimit,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Returns `true` if the caller can fix this by changing the request.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    /// Returns `true` if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for BookingError {
    fn from(error: sqlx::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_field() {
        let mut errors = ValidationErrors::new();
        errors.add("customer_name", "is required");
        errors.add("guests", "must be at least 1");

        let err = errors.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: customer_name: is required; guests: must be at least 1"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_lifecycle_errors_are_conflicts() {
        let err = BookingError::InvalidTransition {
            from: BookingStatus::CheckedIn,
            to: BookingStatus::Cancelled,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Cannot transition booking from checked_in to cancelled");
        assert_eq!(BookingError::AlreadyCancelled.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_token_errors_are_distinct_from_not_found() {
        let err = BookingError::from(TokenError::Mismatch);
        assert_eq!(err.kind(), ErrorKind::Token);
        assert_ne!(err.kind(), BookingError::not_found("booking", "ABC").kind());
    }

    #[test]
    fn test_only_storage_is_retryable() {
        assert!(BookingError::Storage("connection reset".into()).is_retryable());
        assert!(!BookingError::AlreadyCancelled.is_retryable());
    }
}
