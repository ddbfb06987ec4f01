//! Persistence collaborator.
//!
//! Every write that a concurrent caller could race on is a single store
//! operation: admission checks and inserts under one lock or transaction,
//! lifecycle updates load-for-update and apply a closure, waitlist updates
//! serialize per scope, and usage redemption checks its ceilings and
//! increments in one step.
//!
//! # Implementations
//!
//! - [`InMemoryStore`]: one mutex over every table
//! - `PostgresStore` (feature `postgres`): transactions, row locks and
//!   conditional updates

use crate::availability::{AdmissionRequest, Availability};
use crate::error::Result;
use crate::ledger::LedgerSnapshot;
use crate::query::{BookingQuery, Page};
use crate::types::{
    Booking, BookingId, Category, CategoryId, ConfirmationCode, CredentialId, ElementId, Event,
    EventId, FloorPlanElement, UsageCredential, UsageRecord, WaitlistEntry, WaitlistEntryId,
    WaitlistScope,
};
use chrono::{DateTime, Utc};
use std::future::Future;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Result of an atomic check-and-insert.
#[derive(Clone, Debug, PartialEq)]
pub enum Admission {
    /// Capacity was reserved and the booking persisted
    Admitted(Booking),
    /// Capacity was not available; nothing was written
    Refused {
        /// The checker's verdict
        availability: Availability,
        /// Whether the event accepts waitlist entries
        waitlist_open: bool,
    },
    /// Another booking already owns the confirmation code; nothing was written
    CodeTaken,
}

/// Storage for events, bookings, waitlists and usage credentials.
///
/// # Atomicity
///
/// - `admit_booking` must check availability and insert as one unit, so two
///   concurrent admissions can never both pass the same limit
/// - `update_booking` must hold the row while the closure runs, and back out
///   category `sold` when the booking stops holding capacity
/// - `update_waitlist` must serialize callers per scope
/// - `redeem_usage` must check ceilings and increment in one step
///
/// A closure returning `Err` leaves the store untouched.
pub trait BookingStore: Send + Sync + 'static {
    // ═══════════════════════════════════════════════════════════════════════
    // Reference data
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert or replace an event.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_event(&self, event: &Event) -> impl Future<Output = Result<()>> + Send;

    /// Look up an event.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn get_event(&self, id: EventId) -> impl Future<Output = Result<Option<Event>>> + Send;

    /// Insert or replace a category.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_category(&self, category: &Category) -> impl Future<Output = Result<()>> + Send;

    /// Look up a category.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn get_category(&self, id: CategoryId)
    -> impl Future<Output = Result<Option<Category>>> + Send;

    /// Insert or replace a floor-plan element.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_element(&self, element: &FloorPlanElement) -> impl Future<Output = Result<()>> + Send;

    /// Look up a floor-plan element.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn get_element(
        &self,
        id: ElementId,
    ) -> impl Future<Output = Result<Option<FloorPlanElement>>> + Send;

    /// Insert or replace a coupon or pass.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn save_credential(
        &self,
        credential: &UsageCredential,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Look up a coupon or pass.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn get_credential(
        &self,
        id: CredentialId,
    ) -> impl Future<Output = Result<Option<UsageCredential>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Bookings
    // ═══════════════════════════════════════════════════════════════════════

    /// Current ledger figures for `request`, without reserving anything.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown event, category or element.
    fn ledger_snapshot(
        &self,
        request: &AdmissionRequest,
    ) -> impl Future<Output = Result<LedgerSnapshot>> + Send;

    /// Atomically check availability for `request` and persist `booking`.
    ///
    /// On admission the booking's category `sold` counter moves by the
    /// request's demand in the same unit of work.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown references and `Storage` on commit failure.
    fn admit_booking(
        &self,
        request: &AdmissionRequest,
        booking: Booking,
    ) -> impl Future<Output = Result<Admission>> + Send;

    /// Look up a booking by id.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn get_booking(&self, id: BookingId) -> impl Future<Output = Result<Option<Booking>>> + Send;

    /// Look up a booking by confirmation code.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn find_booking_by_code(
        &self,
        code: &ConfirmationCode,
    ) -> impl Future<Output = Result<Option<Booking>>> + Send;

    /// One page of an event's bookings.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn list_bookings(
        &self,
        event_id: EventId,
        query: &BookingQuery,
    ) -> impl Future<Output = Result<Page<Booking>>> + Send;

    /// Load a booking for update, apply `f`, and persist the result.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, whatever `f` returns, or `Storage`.
    fn update_booking<F, R>(
        &self,
        id: BookingId,
        f: F,
    ) -> impl Future<Output = Result<(Booking, R)>> + Send
    where
        F: FnOnce(&mut Booking) -> Result<R> + Send,
        R: Send;

    /// Hard-delete a booking, releasing whatever capacity it held.
    ///
    /// Returns the deleted record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id or `Storage`.
    fn delete_booking(&self, id: BookingId) -> impl Future<Output = Result<Booking>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Waitlist
    // ═══════════════════════════════════════════════════════════════════════

    /// Look up a waitlist entry.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn get_waitlist_entry(
        &self,
        id: WaitlistEntryId,
    ) -> impl Future<Output = Result<Option<WaitlistEntry>>> + Send;

    /// Every entry of `scope`, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn list_waitlist(
        &self,
        scope: WaitlistScope,
    ) -> impl Future<Output = Result<Vec<WaitlistEntry>>> + Send;

    /// Lock `scope`, apply `f` to its entries, and persist new or changed entries.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or `Storage`.
    fn update_waitlist<F, R>(
        &self,
        scope: WaitlistScope,
        f: F,
    ) -> impl Future<Output = Result<R>> + Send
    where
        F: FnOnce(&mut Vec<WaitlistEntry>) -> Result<R> + Send,
        R: Send;

    /// Scopes holding at least one offer that lapsed at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails.
    fn scopes_with_lapsed_offers(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<WaitlistScope>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Usage
    // ═══════════════════════════════════════════════════════════════════════

    /// Check the credential's ceilings, insert `record` and increment `used`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for an inactive credential, `Conflict`
    /// when the booking already used the credential, `UsageLimit`, or `Storage`.
    fn redeem_usage(
        &self,
        record: UsageRecord,
    ) -> impl Future<Output = Result<UsageRecord>> + Send;
}
