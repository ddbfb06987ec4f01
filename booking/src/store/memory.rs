//! In-memory store.
//!
//! One mutex guards every table, so each trait operation is atomic with
//! respect to every other. Used by tests and single-process deployments.

use super::{Admission, BookingStore};
use crate::availability::{AdmissionRequest, AvailabilityChecker};
use crate::error::{BookingError, Result};
use crate::ledger::{self, LedgerSnapshot};
use crate::query::{BookingQuery, Page};
use crate::types::{
    Booking, BookingId, Category, CategoryId, ConfirmationCode, CredentialId, ElementId, Event,
    EventId, FloorPlanElement, UsageCredential, UsageRecord, WaitlistEntry, WaitlistEntryId,
    WaitlistScope,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    categories: HashMap<CategoryId, Category>,
    elements: HashMap<ElementId, FloorPlanElement>,
    bookings: HashMap<BookingId, Booking>,
    // Codes are never released, even when their booking is deleted.
    codes: HashMap<ConfirmationCode, BookingId>,
    waitlist: HashMap<WaitlistEntryId, WaitlistEntry>,
    credentials: HashMap<CredentialId, UsageCredential>,
    usage: Vec<UsageRecord>,
}

impl Tables {
    fn snapshot(&self, request: &AdmissionRequest) -> Result<LedgerSnapshot> {
        let event = self
            .events
            .get(&request.event_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("event", request.event_id))?;
        let category = request
            .category_id
            .map(|id| {
                self.categories
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| BookingError::not_found("category", id))
            })
            .transpose()?;
        let element = request
            .element_id
            .map(|id| {
                self.elements
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| BookingError::not_found("element", id))
            })
            .transpose()?;

        Ok(LedgerSnapshot::build(
            event,
            category,
            element,
            self.bookings.values(),
        ))
    }

    fn release_category(&mut self, booking: &Booking) {
        if let Some(category) = booking
            .category_id
            .and_then(|id| self.categories.get_mut(&id))
        {
            category.sold = category.sold.saturating_sub(booking.capacity_demand());
        }
    }
}

/// In-memory [`BookingStore`].
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every booking, in no particular order (for testing).
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.values().cloned().collect()
    }

    /// Every usage record (for testing).
    #[must_use]
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.lock().usage.clone()
    }
}

impl BookingStore for InMemoryStore {
    async fn save_event(&self, event: &Event) -> Result<()> {
        self.lock().events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn save_category(&self, category: &Category) -> Result<()> {
        self.lock().categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.lock().categories.get(&id).cloned())
    }

    async fn save_element(&self, element: &FloorPlanElement) -> Result<()> {
        self.lock().elements.insert(element.id, element.clone());
        Ok(())
    }

    async fn get_element(&self, id: ElementId) -> Result<Option<FloorPlanElement>> {
        Ok(self.lock().elements.get(&id).cloned())
    }

    async fn save_credential(&self, credential: &UsageCredential) -> Result<()> {
        self.lock()
            .credentials
            .insert(credential.id, credential.clone());
        Ok(())
    }

    async fn get_credential(&self, id: CredentialId) -> Result<Option<UsageCredential>> {
        Ok(self.lock().credentials.get(&id).cloned())
    }

    async fn ledger_snapshot(&self, request: &AdmissionRequest) -> Result<LedgerSnapshot> {
        self.lock().snapshot(request)
    }

    async fn admit_booking(&self, request: &AdmissionRequest, booking: Booking) -> Result<Admission> {
        let mut tables = self.lock();

        let snapshot = tables.snapshot(request)?;
        let availability = AvailabilityChecker::check(&snapshot, request);
        if !availability.admitted {
            return Ok(Admission::Refused {
                availability,
                waitlist_open: snapshot.event.waitlist_enabled,
            });
        }
        if tables.codes.contains_key(&booking.confirmation_code) {
            return Ok(Admission::CodeTaken);
        }

        if let Some(category) = request
            .category_id
            .and_then(|id| tables.categories.get_mut(&id))
        {
            category.sold = category.sold.saturating_add(request.demand());
        }
        tables
            .codes
            .insert(booking.confirmation_code.clone(), booking.id);
        tables.bookings.insert(booking.id, booking.clone());

        Ok(Admission::Admitted(booking))
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn find_booking_by_code(&self, code: &ConfirmationCode) -> Result<Option<Booking>> {
        let tables = self.lock();
        Ok(tables
            .codes
            .get(code)
            .and_then(|id| tables.bookings.get(id))
            .cloned())
    }

    async fn list_bookings(&self, event_id: EventId, query: &BookingQuery) -> Result<Page<Booking>> {
        let tables = self.lock();
        let mut matching: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| b.event_id == event_id && query.matches(b))
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit()).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    async fn update_booking<F, R>(&self, id: BookingId, f: F) -> Result<(Booking, R)>
    where
        F: FnOnce(&mut Booking) -> Result<R> + Send,
        R: Send,
    {
        let mut tables = self.lock();
        let current = tables
            .bookings
            .get(&id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("booking", id))?;

        let mut updated = current.clone();
        let result = f(&mut updated)?;

        if current.status.holds_inventory() && !updated.status.holds_inventory() {
            tables.release_category(&current);
        }
        tables.bookings.insert(id, updated.clone());

        Ok((updated, result))
    }

    async fn delete_booking(&self, id: BookingId) -> Result<Booking> {
        let mut tables = self.lock();
        let booking = tables
            .bookings
            .remove(&id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;
        if booking.status.holds_inventory() {
            tables.release_category(&booking);
        }
        Ok(booking)
    }

    async fn get_waitlist_entry(&self, id: WaitlistEntryId) -> Result<Option<WaitlistEntry>> {
        Ok(self.lock().waitlist.get(&id).cloned())
    }

    async fn list_waitlist(&self, scope: WaitlistScope) -> Result<Vec<WaitlistEntry>> {
        let tables = self.lock();
        let mut entries: Vec<WaitlistEntry> = tables
            .waitlist
            .values()
            .filter(|e| e.scope() == scope)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.position);
        Ok(entries)
    }

    async fn update_waitlist<F, R>(&self, scope: WaitlistScope, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<WaitlistEntry>) -> Result<R> + Send,
        R: Send,
    {
        let mut tables = self.lock();
        let mut entries: Vec<WaitlistEntry> = tables
            .waitlist
            .values()
            .filter(|e| e.scope() == scope)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.position);

        let result = f(&mut entries)?;

        if let Some(stray) = entries.iter().find(|e| e.scope() != scope) {
            return Err(BookingError::Conflict(format!(
                "waitlist entry {} does not belong to {scope}",
                stray.id
            )));
        }
        for entry in entries {
            tables.waitlist.insert(entry.id, entry);
        }
        Ok(result)
    }

    async fn scopes_with_lapsed_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistScope>> {
        let tables = self.lock();
        let scopes: HashSet<WaitlistScope> = tables
            .waitlist
            .values()
            .filter(|e| e.offer_lapsed(now))
            .map(WaitlistEntry::scope)
            .collect();
        Ok(scopes.into_iter().collect())
    }

    async fn redeem_usage(&self, record: UsageRecord) -> Result<UsageRecord> {
        let mut tables = self.lock();

        match tables.credentials.get(&record.credential_id) {
            None => return Err(BookingError::not_found("credential", record.credential_id)),
            Some(credential) if !credential.active => {
                return Err(BookingError::invalid("credential_id", "credential is not active"));
            },
            Some(_) => {},
        }
        if !tables.bookings.contains_key(&record.booking_id) {
            return Err(BookingError::not_found("booking", record.booking_id));
        }
        if tables
            .usage
            .iter()
            .any(|u| u.credential_id == record.credential_id && u.booking_id == record.booking_id)
        {
            return Err(BookingError::Conflict(format!(
                "credential already applied to booking {}",
                record.booking_id
            )));
        }
        let uses_by_user = tables
            .usage
            .iter()
            .filter(|u| u.credential_id == record.credential_id && u.user == record.user)
            .count();
        let uses_by_user = u32::try_from(uses_by_user).unwrap_or(u32::MAX);

        let credential = tables
            .credentials
            .get_mut(&record.credential_id)
            .ok_or_else(|| BookingError::not_found("credential", record.credential_id))?;
        ledger::check_usage_ceilings(credential, uses_by_user)?;

        credential.used = credential.used.saturating_add(1);
        tables.usage.push(record.clone());
        Ok(record)
    }
}
