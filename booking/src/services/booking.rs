//! Caller-facing booking operations.
//!
//! [`BookingService`] is the imperative shell around the booking reducer:
//! it validates requests, asks the store to admit or update a record
//! atomically, runs the reducer inside the store's closure, and executes the
//! resulting notifications once the store has committed.

use super::verifier::{self, CheckInOutcome};
use super::waitlist::{JoinWaitlist, SweepReport, WaitlistQueue, is_email, required};
use crate::aggregates::{BookingAction, BookingEnvironment, BookingOutcome, BookingReducer, BookingState};
use crate::availability::{AdmissionRequest, Availability, AvailabilityChecker};
use crate::config::{BookingPolicy, Config};
use crate::error::{BookingError, Result, ValidationErrors};
use crate::metrics;
use crate::notify::Notifier;
use crate::query::{BookingQuery, Page};
use crate::store::{Admission, BookingStore};
use crate::types::{
    Booking, BookingId, BookingKind, BookingStatus, Category, CategoryId, ConfirmationCode,
    Customer, ElementId, Event, EventId, FloorPlanElement, Money, PaymentStatus, UserId,
    WaitlistEntry, WaitlistEntryId, demand_for,
};
use chrono::{DateTime, Utc};
use seatkeeper_core::effect::execute;
use seatkeeper_core::environment::Clock;
use seatkeeper_core::reducer::Reducer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Currency used when a booking has no priced category.
pub const DEFAULT_CURRENCY: &str = "EUR";

// ============================================================================
// Requests and results
// ============================================================================

/// A booking looked up either by id or by confirmation code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingKey {
    /// Internal id
    Id(BookingId),
    /// Public confirmation code
    Code(ConfirmationCode),
}

impl FromStr for BookingKey {
    type Err = BookingError;

    /// UUIDs are ids; anything else non-empty is a confirmation code.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BookingError::invalid("key", "is required"));
        }
        Ok(Uuid::parse_str(s).map_or_else(
            |_| Self::Code(ConfirmationCode::new(s)),
            |uuid| Self::Id(BookingId::from_uuid(uuid)),
        ))
    }
}

impl fmt::Display for BookingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Code(code) => write!(f, "{code}"),
        }
    }
}

/// Booking request as submitted by a caller.
///
/// Every field is optional on the wire so that validation can report all
/// missing or malformed fields at once.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NewBooking {
    /// Event to book
    pub event_id: Option<EventId>,
    /// Registered user, if any
    pub user_id: Option<UserId>,
    /// Reservation or ticket; reservation when omitted
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<BookingKind>,
    /// Free-text category tag
    pub subtype: Option<String>,
    /// Ticket category
    pub category_id: Option<CategoryId>,
    /// Floor-plan element to hold exclusively
    pub element_id: Option<ElementId>,
    /// Units requested, default 1
    pub quantity: Option<u32>,
    /// Guests, default the quantity
    pub guests: Option<u32>,
    /// Customer name
    pub customer_name: Option<String>,
    /// Customer email
    pub customer_email: Option<String>,
    /// Customer phone
    pub customer_phone: Option<String>,
    /// Notes visible to the customer
    pub customer_notes: Option<String>,
    /// Staff-only notes
    pub internal_notes: Option<String>,
    /// Initial payment state, default `none`
    pub payment_status: Option<PaymentStatus>,
    /// Opaque extension data
    pub payload: Option<serde_json::Value>,
}

/// Parameters of an availability check.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AvailabilityQuery {
    /// Reservation or ticket; reservation when omitted
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<BookingKind>,
    /// Units requested, default 1
    pub quantity: Option<u32>,
    /// Guests, default the quantity
    pub guests: Option<u32>,
    /// Ticket category
    pub category_id: Option<CategoryId>,
    /// Floor-plan element
    pub element_id: Option<ElementId>,
}

/// What a submission produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Submission {
    /// Capacity was reserved
    Booked {
        /// The new booking
        booking: Booking,
    },
    /// Capacity was full and the request joined the waitlist
    Waitlisted {
        /// The new waitlist entry
        entry: WaitlistEntry,
        /// Why the booking was refused
        availability: Availability,
    },
}

enum Placement {
    Admitted(Booking),
    Refused {
        availability: Availability,
        waitlist_open: bool,
    },
}

struct Validated {
    admission: AdmissionRequest,
    event: Event,
    category: Option<Category>,
    element: Option<FloorPlanElement>,
    customer: Customer,
}

// ============================================================================
// Service
// ============================================================================

/// Booking lifecycle operations over a store and a notifier.
pub struct BookingService<S, N> {
    store: Arc<S>,
    env: BookingEnvironment<N>,
    reducer: BookingReducer<N>,
    policy: BookingPolicy,
    waitlist: WaitlistQueue<S, N>,
}

impl<S, N> Clone for BookingService<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env: self.env.clone(),
            reducer: self.reducer.clone(),
            policy: self.policy.clone(),
            waitlist: self.waitlist.clone(),
        }
    }
}

impl<S: BookingStore, N: Notifier> BookingService<S, N> {
    /// Creates a new `BookingService`
    #[must_use]
    pub fn new(store: Arc<S>, notifier: Arc<N>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            waitlist: WaitlistQueue::new(
                Arc::clone(&store),
                Arc::clone(&notifier),
                Arc::clone(&clock),
                config.waitlist.clone(),
            ),
            store,
            env: BookingEnvironment::new(clock, notifier),
            reducer: BookingReducer::new(),
            policy: config.booking.clone(),
        }
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The waitlist queue sharing this service's store and notifier
    #[must_use]
    pub const fn waitlist(&self) -> &WaitlistQueue<S, N> {
        &self.waitlist
    }

    /// Booking policy in effect
    #[must_use]
    pub const fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════════════════

    /// Validate, check availability and persist a booking in one atomic step.
    ///
    /// # Errors
    ///
    /// - `Validation` listing every missing or malformed field
    /// - `CapacityExceeded` when the element, category or event is full
    /// - `Storage` when no unused confirmation code was found or the store failed
    #[tracing::instrument(skip(self, request), fields(event_id = ?request.event_id))]
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking> {
        match self.place(&request).await? {
            Placement::Admitted(booking) => Ok(booking),
            Placement::Refused {
                availability,
                waitlist_open,
            } => {
                metrics::record_booking("rejected");
                Err(refusal(availability, waitlist_open))
            },
        }
    }

    /// Create a booking, or join the waitlist when capacity is full and the
    /// event keeps one.
    ///
    /// # Errors
    ///
    /// As [`create_booking`](Self::create_booking); `CapacityExceeded` only
    /// when the event keeps no waitlist.
    #[tracing::instrument(skip(self, request), fields(event_id = ?request.event_id))]
    pub async fn submit(&self, request: NewBooking) -> Result<Submission> {
        match self.place(&request).await? {
            Placement::Admitted(booking) => Ok(Submission::Booked { booking }),
            Placement::Refused {
                availability,
                waitlist_open: true,
            } => {
                let quantity = request.quantity.unwrap_or(1);
                let demand = demand_for(
                    request.kind.unwrap_or(BookingKind::Reservation),
                    quantity,
                    request.guests.unwrap_or(quantity),
                );
                let entry = self
                    .waitlist
                    .join(JoinWaitlist {
                        event_id: request.event_id,
                        user_id: request.user_id,
                        category_id: request.category_id,
                        element_id: request.element_id,
                        customer_name: request.customer_name,
                        customer_email: request.customer_email,
                        customer_phone: request.customer_phone,
                        quantity: Some(demand),
                    })
                    .await?;
                metrics::record_booking("waitlisted");
                Ok(Submission::Waitlisted {
                    entry,
                    availability,
                })
            },
            Placement::Refused { availability, .. } => {
                metrics::record_booking("rejected");
                Err(refusal(availability, false))
            },
        }
    }

    async fn place(&self, request: &NewBooking) -> Result<Placement> {
        let validated = self.validate(request).await?;
        let attempts = self.policy.code_attempts.max(1);

        for attempt in 1..=attempts {
            let booking = self.draft(&validated, request, self.env.clock.now());
            let mut state = BookingState::default();
            let effects = self.reducer.reduce(
                &mut state,
                BookingAction::Place {
                    booking: Box::new(booking.clone()),
                },
                &self.env,
            );
            if let Some(error) = state.last_error {
                return Err(error);
            }

            match self.store.admit_booking(&validated.admission, booking).await? {
                Admission::Admitted(booking) => {
                    execute(effects).await;
                    metrics::record_booking("created");
                    tracing::info!(
                        booking_id = %booking.id,
                        code = %booking.confirmation_code,
                        status = %booking.status,
                        demand = booking.capacity_demand(),
                        "Booking created"
                    );
                    return Ok(Placement::Admitted(booking));
                },
                Admission::Refused {
                    availability,
                    waitlist_open,
                } => {
                    tracing::info!(reason = %availability.reason, remaining = ?availability.remaining, "Booking refused");
                    return Ok(Placement::Refused {
                        availability,
                        waitlist_open,
                    });
                },
                Admission::CodeTaken => {
                    tracing::warn!(attempt, "Confirmation code collision, retrying");
                },
            }
        }

        Err(BookingError::Storage(format!(
            "no unused confirmation code after {attempts} attempts"
        )))
    }

    async fn validate(&self, request: &NewBooking) -> Result<Validated> {
        let now = self.env.clock.now();
        let mut errors = ValidationErrors::new();

        let name = required(&mut errors, "customer_name", request.customer_name.as_deref());
        let email = required(&mut errors, "customer_email", request.customer_email.as_deref());
        if email.as_deref().is_some_and(|e| !is_email(e)) {
            errors.add("customer_email", "is not a valid email address");
        }

        let kind = request.kind.unwrap_or(BookingKind::Reservation);
        let quantity = request.quantity.unwrap_or(1);
        if quantity == 0 {
            errors.add("quantity", "must be at least 1");
        } else if quantity > self.policy.max_quantity {
            errors.add(
                "quantity",
                format!("must be at most {}", self.policy.max_quantity),
            );
        }
        let guests = request.guests.unwrap_or_else(|| quantity.max(1));
        if guests == 0 {
            errors.add("guests", "must be at least 1");
        }

        let event = match request.event_id {
            Some(id) => {
                let event = self.store.get_event(id).await?;
                if event.is_none() {
                    errors.add("event_id", "unknown event");
                }
                event
            },
            None => {
                errors.add("event_id", "is required");
                None
            },
        };
        let event_id = event.as_ref().map(|e| e.id);

        let category = match request.category_id {
            Some(id) => match self.store.get_category(id).await? {
                Some(category) if event_id.is_some_and(|e| e != category.event_id) => {
                    errors.add("category_id", "belongs to another event");
                    None
                },
                Some(category) if !category.on_sale(now) => {
                    errors.add("category_id", format!("{} is not on sale", category.name));
                    None
                },
                Some(category) => Some(category),
                None => {
                    errors.add("category_id", "unknown category");
                    None
                },
            },
            None => None,
        };

        let element = match request.element_id {
            Some(id) => match self.store.get_element(id).await? {
                Some(element) if event_id.is_some_and(|e| e != element.event_id) => {
                    errors.add("element_id", "belongs to another event");
                    None
                },
                Some(element) => {
                    if guests > element.seats {
                        errors.add(
                            "guests",
                            format!("{} seats at most {}", element.label, element.seats),
                        );
                    }
                    Some(element)
                },
                None => {
                    errors.add("element_id", "unknown element");
                    None
                },
            },
            None => None,
        };

        errors.into_result()?;
        let (Some(event), Some(name), Some(email)) = (event, name, email) else {
            return Err(BookingError::invalid("event_id", "is required"));
        };

        Ok(Validated {
            admission: AdmissionRequest {
                event_id: event.id,
                kind,
                quantity,
                guests,
                category_id: category.as_ref().map(|c| c.id),
                element_id: element.as_ref().map(|e| e.id),
            },
            event,
            category,
            element,
            customer: Customer {
                name,
                email,
                phone: request
                    .customer_phone
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            },
        })
    }

    fn draft(&self, validated: &Validated, request: &NewBooking, now: DateTime<Utc>) -> Booking {
        let admission = &validated.admission;
        let status = if validated.event.auto_confirm || self.policy.auto_confirm {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Pending
        };
        let (price, currency) = validated.category.as_ref().map_or_else(
            || (Money::default(), DEFAULT_CURRENCY.to_string()),
            |category| {
                (
                    Money::from_cents(
                        category
                            .price
                            .cents()
                            .saturating_mul(u64::from(admission.quantity)),
                    ),
                    category.currency.clone(),
                )
            },
        );

        Booking {
            id: BookingId::new(),
            event_id: admission.event_id,
            user_id: request.user_id,
            kind: admission.kind,
            subtype: request.subtype.clone(),
            element_id: admission.element_id,
            element_label: validated.element.as_ref().map(|e| e.label.clone()),
            category_id: admission.category_id,
            price,
            currency,
            payment_status: request.payment_status.unwrap_or_default(),
            status,
            quantity: admission.quantity,
            guests: admission.guests,
            customer: validated.customer.clone(),
            customer_notes: request.customer_notes.clone(),
            internal_notes: request.internal_notes.clone(),
            payload: request.payload.clone().unwrap_or(serde_json::Value::Null),
            confirmation_code: verifier::generate_confirmation_code(self.policy.code_length),
            cancel_token: verifier::generate_cancel_token(),
            cancel_token_expires_at: now + self.policy.cancel_token_ttl(),
            checked_in_at: None,
            checked_in_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Look up a booking by id or confirmation code.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches.
    pub async fn get_booking(&self, key: &BookingKey) -> Result<Booking> {
        let found = match key {
            BookingKey::Id(id) => self.store.get_booking(*id).await?,
            BookingKey::Code(code) => self.store.find_booking_by_code(code).await?,
        };
        found.ok_or_else(|| BookingError::not_found("booking", key))
    }

    /// One page of an event's bookings.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed filters and `NotFound` for an unknown event.
    #[tracing::instrument(skip(self, query))]
    pub async fn list_bookings(&self, event_id: EventId, query: &BookingQuery) -> Result<Page<Booking>> {
        query.validate()?;
        if self.store.get_event(event_id).await?.is_none() {
            return Err(BookingError::not_found("event", event_id));
        }
        self.store.list_bookings(event_id, query).await
    }

    /// Would a request with these parameters be admitted right now?
    ///
    /// Nothing is reserved; the answer may change before a booking is placed.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a zero quantity or a category/element that is
    /// unknown or belongs to another event, and `NotFound` for an unknown event.
    #[tracing::instrument(skip(self))]
    pub async fn check_availability(
        &self,
        event_id: EventId,
        query: AvailabilityQuery,
    ) -> Result<Availability> {
        let quantity = query.quantity.unwrap_or(1);
        let mut errors = ValidationErrors::new();
        if quantity == 0 {
            errors.add("quantity", "must be at least 1");
        }
        if query.guests == Some(0) {
            errors.add("guests", "must be at least 1");
        }
        if let Some(id) = query.category_id {
            match self.store.get_category(id).await? {
                Some(category) if category.event_id != event_id => {
                    errors.add("category_id", "belongs to another event");
                },
                Some(_) => {},
                None => errors.add("category_id", "unknown category"),
            }
        }
        if let Some(id) = query.element_id {
            match self.store.get_element(id).await? {
                Some(element) if element.event_id != event_id => {
                    errors.add("element_id", "belongs to another event");
                },
                Some(_) => {},
                None => errors.add("element_id", "unknown element"),
            }
        }
        errors.into_result()?;

        let request = AdmissionRequest {
            event_id,
            kind: query.kind.unwrap_or(BookingKind::Reservation),
            quantity,
            guests: query.guests.unwrap_or(quantity),
            category_id: query.category_id,
            element_id: query.element_id,
        };
        let snapshot = self.store.ledger_snapshot(&request).await?;
        Ok(AvailabilityChecker::check(&snapshot, &request))
    }

    /// URL a check-in QR code should encode for `code`.
    #[must_use]
    pub fn check_in_url(&self, code: &ConfirmationCode) -> String {
        verifier::check_in_url(&self.policy.checkin_base_url, code)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Move a booking to `to`.
    ///
    /// Moving into `cancelled` releases every hold; moving into `no_show`
    /// frees the event seats but keeps the element and category units. What
    /// is released is offered to the waitlist.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `AlreadyCancelled` or `InvalidTransition` when the table forbids the move
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: BookingId, to: BookingStatus) -> Result<Booking> {
        let (booking, _) = self.transition(id, BookingAction::SetStatus { to }).await?;
        Ok(booking)
    }

    /// Check a guest in by id or confirmation code.
    ///
    /// A second check-in changes nothing and reports `already_checked_in`.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id or code
    /// - `AlreadyCancelled` or `InvalidTransition` for cancelled or no-show bookings
    #[tracing::instrument(skip(self))]
    pub async fn check_in(&self, key: &BookingKey, actor: Option<String>) -> Result<CheckInOutcome> {
        let id = self.resolve(key).await?;
        let (booking, outcome) = self.transition(id, BookingAction::CheckIn { actor }).await?;

        let already_checked_in = outcome == Some(BookingOutcome::AlreadyCheckedIn);
        if already_checked_in {
            metrics::record_checkin("already");
            tracing::info!(booking_id = %id, "Booking already checked in");
        } else {
            metrics::record_checkin("checked_in");
        }
        Ok(CheckInOutcome {
            booking,
            already_checked_in,
        })
    }

    /// Cancel a booking, noting `reason` internally.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown id
    /// - `AlreadyCancelled`, or `InvalidTransition` for checked-in and no-show bookings
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: BookingId, reason: Option<String>) -> Result<Booking> {
        let (booking, _) = self.transition(id, BookingAction::Cancel { reason }).await?;
        Ok(booking)
    }

    /// Self-service cancellation by confirmation code and cancel token.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown code
    /// - `Token` for a mismatched or expired token
    /// - `AlreadyCancelled`, or `InvalidTransition` for checked-in and no-show bookings
    #[tracing::instrument(skip(self, token))]
    pub async fn verify_cancellation(
        &self,
        code: &ConfirmationCode,
        token: &str,
        reason: Option<String>,
    ) -> Result<Booking> {
        let booking = self
            .store
            .find_booking_by_code(code)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", code))?;
        let (booking, _) = self
            .transition(
                booking.id,
                BookingAction::CancelWithToken {
                    token: token.to_string(),
                    reason,
                },
            )
            .await?;
        Ok(booking)
    }

    /// Administrative hard delete.
    ///
    /// The confirmation code stays reserved; held capacity is released and
    /// offered to the waitlist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    #[tracing::instrument(skip(self))]
    pub async fn delete_booking(&self, id: BookingId) -> Result<Booking> {
        let booking = self.store.delete_booking(id).await?;
        tracing::info!(booking_id = %id, code = %booking.confirmation_code, "Booking deleted");
        if booking.status.holds_inventory() {
            self.offer_released(&booking).await;
        }
        Ok(booking)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Waitlist
    // ═══════════════════════════════════════════════════════════════════════

    /// Join a waitlist directly.
    ///
    /// # Errors
    ///
    /// See [`WaitlistQueue::join`].
    pub async fn join_waitlist(&self, request: JoinWaitlist) -> Result<WaitlistEntry> {
        self.waitlist.join(request).await
    }

    /// Mark a waitlist offer as claimed by `booking_id`.
    ///
    /// # Errors
    ///
    /// See [`WaitlistQueue::convert`].
    pub async fn convert_waitlist_entry(
        &self,
        entry_id: WaitlistEntryId,
        booking_id: BookingId,
    ) -> Result<WaitlistEntry> {
        self.waitlist.convert(entry_id, booking_id).await
    }

    /// Expire lapsed offers everywhere and promote replacements.
    ///
    /// # Errors
    ///
    /// See [`WaitlistQueue::sweep`].
    pub async fn sweep_waitlist(&self) -> Result<SweepReport> {
        self.waitlist.sweep().await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    async fn resolve(&self, key: &BookingKey) -> Result<BookingId> {
        match key {
            BookingKey::Id(id) => Ok(*id),
            BookingKey::Code(code) => self
                .store
                .find_booking_by_code(code)
                .await?
                .map(|b| b.id)
                .ok_or_else(|| BookingError::not_found("booking", code)),
        }
    }

    /// Runs the reducer on the locked record, persists, then notifies.
    async fn transition(
        &self,
        id: BookingId,
        action: BookingAction,
    ) -> Result<(Booking, Option<BookingOutcome>)> {
        let reducer = &self.reducer;
        let env = &self.env;
        let (booking, (outcome, effects)) = self
            .store
            .update_booking(id, move |booking| {
                let mut state = BookingState::loaded(booking.clone());
                let effects = reducer.reduce(&mut state, action, env);
                if let Some(error) = state.last_error.take() {
                    return Err(error);
                }
                if let Some(updated) = state.booking.take() {
                    *booking = updated;
                }
                Ok((state.outcome, effects))
            })
            .await?;

        execute(effects).await;

        if let Some(BookingOutcome::Transitioned { from, to }) = outcome {
            metrics::record_status_change(to.as_str());
            tracing::info!(booking_id = %id, %from, %to, "Booking status changed");
            if from.releases_on(to) {
                self.offer_released(&booking).await;
            }
        }
        Ok((booking, outcome))
    }

    /// Offer capacity released by `booking` to its waitlists.
    ///
    /// The release itself is already committed, so a failure here is logged
    /// rather than returned.
    async fn offer_released(&self, booking: &Booking) {
        match self.waitlist.promote_after_release(booking).await {
            Ok(change) if !change.promoted.is_empty() => tracing::info!(
                booking_id = %booking.id,
                promoted = change.promoted.len(),
                "Released capacity offered to waitlist"
            ),
            Ok(_) => {},
            Err(error) => tracing::error!(
                booking_id = %booking.id,
                %error,
                "Waitlist promotion after release failed"
            ),
        }
    }
}

fn refusal(availability: Availability, waitlist_open: bool) -> BookingError {
    BookingError::CapacityExceeded {
        remaining: availability.remaining,
        reason: availability.reason,
        waitlist_open,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn test_booking_key_parses_ids_and_codes() {
        let id = BookingId::new();
        assert_eq!(
            id.to_string().parse::<BookingKey>().unwrap(),
            BookingKey::Id(id)
        );
        assert_eq!(
            " abcd2345 ".parse::<BookingKey>().unwrap(),
            BookingKey::Code(ConfirmationCode::new("ABCD2345"))
        );
        assert!("  ".parse::<BookingKey>().is_err());
    }

    #[test]
    fn test_new_booking_accepts_type_or_kind() {
        let by_type: NewBooking =
            serde_json::from_str(r#"{"type":"ticket","quantity":2}"#).unwrap();
        let by_kind: NewBooking = serde_json::from_str(r#"{"kind":"ticket"}"#).unwrap();
        assert_eq!(by_type.kind, Some(BookingKind::Ticket));
        assert_eq!(by_type.quantity, Some(2));
        assert_eq!(by_kind.kind, Some(BookingKind::Ticket));
    }
}
