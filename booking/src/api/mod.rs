//! HTTP surface (feature `http`).
//!
//! Thin axum handlers over [`BookingService`](crate::services::BookingService)
//! and [`UsageTracker`](crate::services::UsageTracker). Every failure is a
//! [`BookingError`](crate::error::BookingError) rendered by [`AppError`].

pub mod bookings;
pub mod credentials;
pub mod error;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod waitlist;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
