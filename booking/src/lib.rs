//! Seatkeeper - capacity-safe reservations, waitlists and check-in for timed events
//!
//! Built on the reducer/effect core in `seatkeeper-core`. It covers:
//!
//! - **Capacity ledger**: event guest limits, category stock and exclusive
//!   floor-plan elements, derived from stored bookings
//! - **Atomic admission**: availability is checked and the booking inserted
//!   as one store operation, so concurrent requests never oversell
//! - **Booking lifecycle**: `pending → confirmed → checked_in`, with
//!   `cancelled` and `no_show` exits, driven by a pure reducer
//! - **Waitlists**: per event, category or element, with time-boxed offers
//!   promoted whenever capacity is released
//! - **Verification**: confirmation codes, QR check-in URLs, idempotent
//!   check-in and self-service cancellation by token
//! - **Usage tracking**: coupon and pass ceilings, global and per user
//!
//! # Architecture
//!
//! ```text
//!   HTTP (axum)        ┌────────────────────┐
//!  ──────────────────▶ │  BookingService    │──── notify ───▶ Notifier
//!                      │  WaitlistQueue     │
//!                      │  UsageTracker      │
//!                      └─────────┬──────────┘
//!                                │ reduce inside store closure
//!                      ┌─────────▼──────────┐
//!                      │ BookingReducer     │  pure transitions,
//!                      │ WaitlistReducer    │  effects run after commit
//!                      └─────────┬──────────┘
//!                                │
//!                      ┌─────────▼──────────┐
//!                      │ BookingStore       │  InMemoryStore / PostgresStore
//!                      └────────────────────┘
//! ```
//!
//! # Capacity Invariant
//!
//! ```text
//! reservations:  reserved_guests(event) + guests   <= event.max_capacity
//! categories:    category.sold          + demand   <= category.capacity
//! elements:      holders(element)                  <= 1
//! ```
//!
//! Elements and category units stay held until the booking is cancelled or
//! deleted. Event guests are counted only while a reservation is pending,
//! confirmed or checked in, so a no-show frees its seats.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
#[cfg(feature = "http")]
pub mod api;
pub mod availability;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod query;
pub mod services;
pub mod store;
pub mod types;

pub use availability::{AdmissionRequest, Availability, AvailabilityChecker};
pub use config::Config;
pub use error::{BookingError, ErrorKind, Result, TokenError, ValidationErrors};
pub use notify::{DomainEvent, LogNotifier, Notifier};
pub use query::{BookingQuery, Page, SortKey, SortOrder};
pub use services::{
    AvailabilityQuery, BookingKey, BookingService, CheckInOutcome, JoinWaitlist, NewBooking,
    Redemption, Submission, UsageTracker, WaitlistQueue,
};
pub use store::{BookingStore, InMemoryStore};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use types::*;
