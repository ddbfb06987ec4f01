//! Waitlist queue operations.
//!
//! Every command runs the [`WaitlistReducer`] inside the store's per-scope
//! lock; notifications go out only after the store has committed.

use crate::aggregates::{WaitlistAction, WaitlistEnvironment, WaitlistReducer, WaitlistState};
use crate::availability::AdmissionRequest;
use crate::config::WaitlistPolicy;
use crate::error::{BookingError, Result, ValidationErrors};
use crate::metrics;
use crate::notify::Notifier;
use crate::store::BookingStore;
use crate::types::{
    Booking, BookingId, BookingKind, CategoryId, Customer, ElementId, EventId, UserId, WaitlistEntry,
    WaitlistEntryId, WaitlistScope,
};
use seatkeeper_core::effect::{Effect, execute};
use seatkeeper_core::environment::Clock;
use seatkeeper_core::reducer::Reducer;
use seatkeeper_core::SmallVec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request to join a waitlist.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct JoinWaitlist {
    /// Event to wait for
    pub event_id: Option<EventId>,
    /// Registered user, if any
    pub user_id: Option<UserId>,
    /// Category to wait for
    pub category_id: Option<CategoryId>,
    /// Element to wait for; takes precedence over the category
    pub element_id: Option<ElementId>,
    /// Who is waiting
    pub customer_name: Option<String>,
    /// Contact email
    pub customer_email: Option<String>,
    /// Contact phone
    pub customer_phone: Option<String>,
    /// Units requested, default 1
    pub quantity: Option<u32>,
}

/// What one waitlist command changed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WaitlistChange {
    /// Entry added by a join
    pub joined: Option<WaitlistEntry>,
    /// Entries offered a slot
    pub promoted: Vec<WaitlistEntry>,
    /// Entries whose offers lapsed
    pub expired: Vec<WaitlistEntry>,
    /// Entry marked converted
    pub converted: Option<WaitlistEntry>,
    /// Free units remain that the queue could not take yet
    pub held_back: bool,
}

impl WaitlistChange {
    fn from_state(state: &WaitlistState) -> Self {
        let pick = |ids: &[WaitlistEntryId]| -> Vec<WaitlistEntry> {
            ids.iter().filter_map(|id| state.entry(*id)).cloned().collect()
        };
        Self {
            joined: state.joined.and_then(|id| state.entry(id)).cloned(),
            promoted: pick(&state.promoted),
            expired: pick(&state.expired),
            converted: state.converted.and_then(|id| state.entry(id)).cloned(),
            held_back: state.held_back,
        }
    }

    fn record_metrics(&self) {
        if self.joined.is_some() {
            metrics::record_waitlist("joined", 1);
        }
        if !self.promoted.is_empty() {
            metrics::record_waitlist("promoted", self.promoted.len() as u64);
        }
        if !self.expired.is_empty() {
            metrics::record_waitlist("expired", self.expired.len() as u64);
        }
        if self.converted.is_some() {
            metrics::record_waitlist("converted", 1);
        }
    }
}

/// Outcome of a sweep across every scope holding lapsed offers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Scopes visited
    pub scopes: usize,
    /// Offers expired
    pub expired: Vec<WaitlistEntry>,
    /// Replacement offers made
    pub promoted: Vec<WaitlistEntry>,
}

/// Per-scope waitlist queue.
pub struct WaitlistQueue<S, N> {
    store: Arc<S>,
    env: WaitlistEnvironment<N>,
    reducer: WaitlistReducer<N>,
}

impl<S, N> Clone for WaitlistQueue<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env: self.env.clone(),
            reducer: self.reducer.clone(),
        }
    }
}

impl<S: BookingStore, N: Notifier> WaitlistQueue<S, N> {
    /// Creates a new `WaitlistQueue`
    #[must_use]
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        policy: WaitlistPolicy,
    ) -> Self {
        Self {
            store,
            env: WaitlistEnvironment::new(clock, notifier, policy),
            reducer: WaitlistReducer::new(),
        }
    }

    /// Runs one command against `scope` under the store's scope lock.
    async fn run(&self, scope: WaitlistScope, action: WaitlistAction) -> Result<WaitlistChange> {
        let reducer = &self.reducer;
        let env = &self.env;
        let (change, effects) = self
            .store
            .update_waitlist(scope, move |entries| {
                let mut state = WaitlistState::new(scope, std::mem::take(entries));
                let effects: SmallVec<[Effect<WaitlistAction>; 4]> =
                    reducer.reduce(&mut state, action, env);
                if let Some(error) = state.last_error.take() {
                    return Err(error);
                }
                let change = WaitlistChange::from_state(&state);
                *entries = state.entries;
                Ok((change, effects))
            })
            .await?;

        change.record_metrics();
        execute(effects).await;
        Ok(change)
    }

    /// Append a request to the back of its scope's queue.
    ///
    /// The scope is the element when one is given, else the category, else
    /// the whole event.
    ///
    /// # Errors
    ///
    /// - `Validation` for missing contact details, a zero quantity, or a
    ///   category/element of another event
    /// - `NotFound` for an unknown event
    /// - `Conflict` when the event does not keep a waitlist
    #[tracing::instrument(skip(self, request), fields(event_id = ?request.event_id))]
    pub async fn join(&self, request: JoinWaitlist) -> Result<WaitlistEntry> {
        let mut errors = ValidationErrors::new();
        let name = required(&mut errors, "customer_name", request.customer_name.as_deref());
        let email = required(&mut errors, "customer_email", request.customer_email.as_deref());
        if email.as_deref().is_some_and(|e| !is_email(e)) {
            errors.add("customer_email", "is not a valid email address");
        }
        let quantity = request.quantity.unwrap_or(1);
        if quantity == 0 {
            errors.add("quantity", "must be at least 1");
        }
        let Some(event_id) = request.event_id else {
            errors.add("event_id", "is required");
            return Err(BookingError::Validation(errors));
        };

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| BookingError::not_found("event", event_id))?;
        if let Some(category_id) = request.category_id {
            match self.store.get_category(category_id).await? {
                Some(category) if category.event_id == event_id => {},
                Some(_) => errors.add("category_id", "belongs to another event"),
                None => errors.add("category_id", "unknown category"),
            }
        }
        if let Some(element_id) = request.element_id {
            match self.store.get_element(element_id).await? {
                Some(element) if element.event_id == event_id => {},
                Some(_) => errors.add("element_id", "belongs to another event"),
                None => errors.add("element_id", "unknown element"),
            }
        }
        errors.into_result()?;

        if !event.waitlist_enabled {
            return Err(BookingError::Conflict(format!(
                "event {event_id} does not keep a waitlist"
            )));
        }

        let scope = WaitlistScope::resolve(event_id, request.category_id, request.element_id);
        let change = self
            .run(
                scope,
                WaitlistAction::Join {
                    entry_id: WaitlistEntryId::new(),
                    user_id: request.user_id,
                    customer: Customer {
                        name: name.unwrap_or_default(),
                        email: email.unwrap_or_default(),
                        phone: request.customer_phone,
                    },
                    quantity,
                    category_id: request.category_id,
                    element_id: request.element_id,
                },
            )
            .await?;

        let entry = change
            .joined
            .ok_or_else(|| BookingError::Storage("join produced no entry".into()))?;
        tracing::info!(entry_id = %entry.id, %scope, position = entry.position, "Joined waitlist");
        Ok(entry)
    }

    /// Units of `scope` no booking holds, `None` when unlimited.
    async fn free_units(&self, scope: WaitlistScope) -> Result<Option<u32>> {
        let (category_id, element_id) = match scope {
            WaitlistScope::Event { .. } => (None, None),
            WaitlistScope::Category { category_id, .. } => (Some(category_id), None),
            WaitlistScope::Element { element_id, .. } => (None, Some(element_id)),
        };
        let request = AdmissionRequest {
            event_id: scope.event_id(),
            kind: BookingKind::Reservation,
            quantity: 1,
            guests: 1,
            category_id,
            element_id,
        };
        let snapshot = self.store.ledger_snapshot(&request).await?;
        Ok(snapshot.scope_remaining(scope))
    }

    /// Expire lapsed offers in `scope`, then offer its free units to the
    /// head of the queue, in position order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the scope's event, category or element is gone
    /// and `Storage` if the scope could not be read or written.
    #[tracing::instrument(skip(self))]
    pub async fn promote(&self, scope: WaitlistScope) -> Result<WaitlistChange> {
        let available = self.free_units(scope).await?;
        let change = self.run(scope, WaitlistAction::Promote { available }).await?;
        for entry in &change.promoted {
            tracing::info!(entry_id = %entry.id, %scope, expires_at = ?entry.expires_at, "Waitlist offer made");
        }
        Ok(change)
    }

    /// Offer capacity released by `booking`, most specific scope first.
    ///
    /// Stops at the first scope that makes an offer or still has people
    /// waiting for its free units; wider queues are tried only when a
    /// narrower one has nothing to take.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a scope could not be read or written.
    pub async fn promote_after_release(&self, booking: &Booking) -> Result<WaitlistChange> {
        let mut combined = WaitlistChange::default();
        for scope in booking.released_scopes() {
            let change = self.promote(scope).await?;
            let settled = change.held_back || !change.promoted.is_empty();
            combined.expired.extend(change.expired);
            combined.promoted.extend(change.promoted);
            if settled {
                combined.held_back = change.held_back;
                break;
            }
        }
        Ok(combined)
    }

    /// Expire every lapsed offer and refill the affected queues.
    ///
    /// Meant to be called on a timer by an external scheduler.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a scope could not be read or written.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.env.clock.now();
        let scopes = self.store.scopes_with_lapsed_offers(now).await?;

        let mut report = SweepReport {
            scopes: scopes.len(),
            ..SweepReport::default()
        };
        for scope in scopes {
            let change = self.promote(scope).await?;
            report.expired.extend(change.expired);
            report.promoted.extend(change.promoted);
        }

        tracing::info!(
            scopes = report.scopes,
            expired = report.expired.len(),
            promoted = report.promoted.len(),
            "Waitlist sweep finished"
        );
        Ok(report)
    }

    /// Mark a live offer as claimed by `booking_id`.
    ///
    /// Units the claim left free are offered to the next entries at once.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown entry or booking
    /// - `Validation` when the booking is for another event
    /// - `Conflict` when the entry is not notified or its offer lapsed
    #[tracing::instrument(skip(self))]
    pub async fn convert(
        &self,
        entry_id: WaitlistEntryId,
        booking_id: BookingId,
    ) -> Result<WaitlistEntry> {
        let entry = self
            .store
            .get_waitlist_entry(entry_id)
            .await?
            .ok_or_else(|| BookingError::not_found("waitlist entry", entry_id))?;
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if booking.event_id != entry.event_id {
            return Err(BookingError::invalid(
                "booking_id",
                "booking is for a different event than the waitlist entry",
            ));
        }

        let change = self
            .run(
                entry.scope(),
                WaitlistAction::Convert {
                    entry_id,
                    booking_id,
                },
            )
            .await?;
        let converted = change
            .converted
            .ok_or_else(|| BookingError::Storage("conversion produced no entry".into()))?;

        if let Err(error) = self.promote(converted.scope()).await {
            tracing::error!(entry_id = %entry_id, %error, "Waitlist promotion after conversion failed");
        }
        Ok(converted)
    }

    /// Every entry of `scope`, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the scope could not be read.
    pub async fn entries(&self, scope: WaitlistScope) -> Result<Vec<WaitlistEntry>> {
        self.store.list_waitlist(scope).await
    }
}

/// Trimmed, non-empty value of a required text field.
pub(crate) fn required(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&str>,
) -> Option<String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => Some(value.to_string()),
        None => {
            errors.add(field, "is required");
            None
        },
    }
}

/// Loose email shape check: one `@`, a non-empty local part, a dotted domain.
pub(crate) fn is_email(value: &str) -> bool {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        },
        None => false,
    }
}
