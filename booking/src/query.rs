//! Listing filters, allow-listed sort keys and pagination.

use crate::error::{BookingError, Result, ValidationErrors};
use crate::types::{Booking, BookingKind, BookingStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Default page size.
pub const DEFAULT_LIMIT: u32 = 50;

/// Largest page size a caller may ask for.
pub const MAX_LIMIT: u32 = 200;

/// Columns a listing may be ordered by. Nothing else reaches an `ORDER BY`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Booking id
    Id,
    /// Creation time
    #[default]
    CreatedAt,
    /// Last update time
    UpdatedAt,
    /// Customer name
    CustomerName,
    /// Lifecycle status
    Status,
}

impl SortKey {
    /// Column the key maps to.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::CustomerName => "customer_name",
            Self::Status => "status",
        }
    }
}

impl FromStr for SortKey {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(Self::Id),
            "created_at" | "createdAt" => Ok(Self::CreatedAt),
            "updated_at" | "updatedAt" => Ok(Self::UpdatedAt),
            "customer_name" | "customerName" => Ok(Self::CustomerName),
            "status" => Ok(Self::Status),
            other => Err(BookingError::invalid(
                "sort",
                format!("'{other}' is not a sortable column"),
            )),
        }
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first
    Asc,
    /// Largest first
    #[default]
    Desc,
}

impl SortOrder {
    /// SQL keyword
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(BookingError::invalid(
                "order",
                format!("'{other}' is not asc or desc"),
            )),
        }
    }
}

/// Filters for listing one event's bookings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingQuery {
    /// Only this status
    pub status: Option<BookingStatus>,
    /// Only this type
    pub kind: Option<BookingKind>,
    /// Only this payment status
    pub payment_status: Option<PaymentStatus>,
    /// Case-insensitive match on customer name, email or confirmation code
    pub search: Option<String>,
    /// Page size, clamped to `1..=200`
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
    /// Sort key
    pub sort: SortKey,
    /// Sort direction
    pub order: SortOrder,
}

impl BookingQuery {
    /// Page size after clamping.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Rows to skip
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Trimmed, non-empty search term.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Rejects malformed filter values.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming every bad field.
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        if self.limit == Some(0) {
            errors.add("limit", "must be at least 1");
        }
        if self.search.as_ref().is_some_and(|s| s.len() > 200) {
            errors.add("search", "must be at most 200 characters");
        }
        errors.into_result()
    }

    /// Whether `booking` passes every filter.
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        if self.status.is_some_and(|s| s != booking.status)
            || self.kind.is_some_and(|k| k != booking.kind)
            || self.payment_status.is_some_and(|p| p != booking.payment_status)
        {
            return false;
        }
        self.search_term().is_none_or(|term| {
            let term = term.to_lowercase();
            booking.customer.name.to_lowercase().contains(&term)
                || booking.customer.email.to_lowercase().contains(&term)
                || booking
                    .confirmation_code
                    .as_str()
                    .to_lowercase()
                    .contains(&term)
        })
    }

    /// Orders `a` and `b` by the sort key and direction, ties broken by id.
    #[must_use]
    pub fn compare(&self, a: &Booking, b: &Booking) -> Ordering {
        let ordering = match self.sort {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortKey::CustomerName => a.customer.name.cmp(&b.customer.name),
            SortKey::Status => a.status.as_str().cmp(b.status.as_str()),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Rows matching the filters across all pages
    pub total: u64,
    /// Page size used
    pub limit: u32,
    /// Rows skipped
    pub offset: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sort_key_is_validation_error() {
        let err = "customer_name; DROP TABLE bookings".parse::<SortKey>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert_eq!("customerName".parse::<SortKey>().ok(), Some(SortKey::CustomerName));
    }

    #[test]
    fn test_limit_is_clamped() {
        let mut query = BookingQuery::default();
        assert_eq!(query.limit(), DEFAULT_LIMIT);
        query.limit = Some(10_000);
        assert_eq!(query.limit(), MAX_LIMIT);
        query.limit = Some(0);
        assert!(query.validate().is_err());
    }
}
