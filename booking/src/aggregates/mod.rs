//! Reducers for the booking and waitlist lifecycles.

pub mod booking;
pub mod waitlist;

pub use booking::{BookingAction, BookingEnvironment, BookingOutcome, BookingReducer, BookingState};
pub use waitlist::{WaitlistAction, WaitlistEnvironment, WaitlistReducer, WaitlistState};
