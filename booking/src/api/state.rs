//! Application state shared by every handler.

use crate::services::{BookingService, UsageTracker};

/// Services behind the HTTP surface, cloned per request.
pub struct AppState<S, N> {
    /// Booking lifecycle, availability and waitlist operations
    pub bookings: BookingService<S, N>,
    /// Coupon and pass redemption
    pub usage: UsageTracker<S, N>,
}

impl<S, N> Clone for AppState<S, N> {
    fn clone(&self) -> Self {
        Self {
            bookings: self.bookings.clone(),
            usage: self.usage.clone(),
        }
    }
}

impl<S, N> AppState<S, N> {
    /// Create a new application state.
    #[must_use]
    pub const fn new(bookings: BookingService<S, N>, usage: UsageTracker<S, N>) -> Self {
        Self { bookings, usage }
    }
}
