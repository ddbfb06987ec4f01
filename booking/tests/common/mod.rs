//! Shared fixtures for the integration tests.

#![allow(dead_code)] // Each test binary uses a subset
#![allow(clippy::expect_used)] // Test code

use seatkeeper::{
    BookingService, BookingStore, Category, Config, CredentialId, CredentialKind, ElementId,
    ElementKind, Event, FloorPlanElement, FloorPlanId, InMemoryStore, Money, NewBooking,
    UsageCredential, UsageTracker, Booking,
};
use seatkeeper::notify::RecordingNotifier;
use seatkeeper_testing::{ManualClock, test_time};
use std::sync::Arc;

/// Services wired over one store, with a controllable clock and a
/// notifier that records every delivered event.
pub struct Harness<S> {
    pub store: Arc<S>,
    pub bookings: BookingService<S, RecordingNotifier>,
    pub usage: UsageTracker<S, RecordingNotifier>,
    pub notifier: RecordingNotifier,
    pub clock: ManualClock,
}

impl Harness<InMemoryStore> {
    pub fn in_memory() -> Self {
        Self::with_store(InMemoryStore::new(), &Config::default())
    }

    pub fn in_memory_with(config: &Config) -> Self {
        Self::with_store(InMemoryStore::new(), config)
    }
}

impl<S: BookingStore> Harness<S> {
    pub fn with_store(store: S, config: &Config) -> Self {
        let store = Arc::new(store);
        let notifier = RecordingNotifier::new();
        let clock = ManualClock::starting_at(test_time());
        let bookings = BookingService::new(
            Arc::clone(&store),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
            config,
        );
        let usage = UsageTracker::new(
            Arc::clone(&store),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        );
        Self {
            store,
            bookings,
            usage,
            notifier,
            clock,
        }
    }

    /// Saves an event with the given reservation capacity.
    pub async fn event(&self, capacity: Option<u32>, waitlist_enabled: bool) -> Event {
        let mut event = Event::new("Friday Night Live");
        event.capacity = capacity;
        event.waitlist_enabled = waitlist_enabled;
        self.store.save_event(&event).await.expect("save event");
        event
    }

    /// Saves an auto-confirming event without limits.
    pub async fn open_event(&self) -> Event {
        let mut event = Event::new("Open House");
        event.auto_confirm = true;
        self.store.save_event(&event).await.expect("save event");
        event
    }

    pub async fn category(&self, event: &Event, capacity: Option<u32>, sold: u32) -> Category {
        let mut category = Category::new(event.id, "General Admission");
        category.capacity = capacity;
        category.sold = sold;
        category.price = Money::from_cents(2_500);
        self.store
            .save_category(&category)
            .await
            .expect("save category");
        category
    }

    pub async fn element(&self, event: &Event, label: &str, seats: u32) -> FloorPlanElement {
        let element = FloorPlanElement {
            id: ElementId::new(),
            floor_plan_id: FloorPlanId::new(),
            event_id: event.id,
            label: label.to_string(),
            kind: ElementKind::Table,
            seats,
        };
        self.store.save_element(&element).await.expect("save element");
        element
    }

    pub async fn credential(&self, usage_limit: Option<u32>, per_user_limit: Option<u32>) -> UsageCredential {
        let credential = UsageCredential {
            id: CredentialId::new(),
            kind: CredentialKind::Coupon,
            code: "SUMMER25".to_string(),
            usage_limit,
            per_user_limit,
            used: 0,
            active: true,
        };
        self.store
            .save_credential(&credential)
            .await
            .expect("save credential");
        credential
    }

    /// Creates a booking that is expected to be admitted.
    pub async fn book(&self, request: NewBooking) -> Booking {
        self.bookings
            .create_booking(request)
            .await
            .expect("booking should be admitted")
    }
}

/// A minimal valid request for `event`.
pub fn request(event: &Event, name: &str) -> NewBooking {
    NewBooking {
        event_id: Some(event.id),
        customer_name: Some(name.to_string()),
        customer_email: Some(format!("{}@example.com", name.to_lowercase())),
        ..NewBooking::default()
    }
}
