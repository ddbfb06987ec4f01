//! Business metrics for the booking engine.
//!
//! # Exported Metrics
//!
//! - `seatkeeper_bookings_total{outcome}` - Submissions by outcome (created, waitlisted, rejected)
//! - `seatkeeper_status_changes_total{to}` - Lifecycle transitions by target status
//! - `seatkeeper_checkins_total{outcome}` - Check-ins (checked_in, already)
//! - `seatkeeper_waitlist_total{event}` - Waitlist activity (joined, promoted, expired, converted)
//! - `seatkeeper_usage_total{outcome}` - Coupon/pass redemptions (recorded, limited)

use metrics::{counter, describe_counter};

/// Register all metric descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "seatkeeper_bookings_total",
        "Booking submissions by outcome (created, waitlisted, rejected)"
    );
    describe_counter!(
        "seatkeeper_status_changes_total",
        "Booking lifecycle transitions by target status"
    );
    describe_counter!(
        "seatkeeper_checkins_total",
        "Check-in attempts by outcome (checked_in, already)"
    );
    describe_counter!(
        "seatkeeper_waitlist_total",
        "Waitlist activity (joined, promoted, expired, converted)"
    );
    describe_counter!(
        "seatkeeper_usage_total",
        "Coupon and pass redemptions by outcome (recorded, limited)"
    );

    tracing::info!("Business metrics registered");
}

/// Record a booking submission outcome.
pub fn record_booking(outcome: &'static str) {
    counter!("seatkeeper_bookings_total", "outcome" => outcome).increment(1);
}

/// Record a lifecycle transition.
pub fn record_status_change(to: &'static str) {
    counter!("seatkeeper_status_changes_total", "to" => to).increment(1);
}

/// Record a check-in attempt.
pub fn record_checkin(outcome: &'static str) {
    counter!("seatkeeper_checkins_total", "outcome" => outcome).increment(1);
}

/// Record waitlist activity.
pub fn record_waitlist(event: &'static str, count: u64) {
    counter!("seatkeeper_waitlist_total", "event" => event).increment(count);
}

/// Record a coupon/pass redemption outcome.
pub fn record_usage(outcome: &'static str) {
    counter!("seatkeeper_usage_total", "outcome" => outcome).increment(1);
}
