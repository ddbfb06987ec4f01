//! Caller-facing operations over a [`BookingStore`](crate::store::BookingStore).

pub mod booking;
pub mod usage;
pub mod verifier;
pub mod waitlist;

pub use booking::{AvailabilityQuery, BookingKey, BookingService, NewBooking, Submission};
pub use usage::{Redemption, UsageTracker};
pub use verifier::CheckInOutcome;
pub use waitlist::{JoinWaitlist, SweepReport, WaitlistChange, WaitlistQueue};
