//! Availability checker: one admit/reject decision per request.
//!
//! Constraints are evaluated element, then category, then event, stopping at
//! the first that refuses. `remaining` comes from the last constraint
//! evaluated and is informational only.

use crate::ledger::LedgerSnapshot;
use crate::types::{BookingKind, CategoryId, ElementId, EventId, demand_for};
use serde::{Deserialize, Serialize};

/// What is being asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Event to book
    pub event_id: EventId,
    /// Reservation or ticket
    pub kind: BookingKind,
    /// Units requested
    pub quantity: u32,
    /// Guests; reservations are sized by this
    pub guests: u32,
    /// Optional ticket category
    pub category_id: Option<CategoryId>,
    /// Optional floor-plan element
    pub element_id: Option<ElementId>,
}

impl AdmissionRequest {
    /// Units this request takes from category and event capacity.
    #[must_use]
    pub const fn demand(&self) -> u32 {
        demand_for(self.kind, self.quantity, self.guests)
    }
}

/// The checker's verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Units left at the last level evaluated; `None` when nothing limits the request
    pub remaining: Option<u32>,
    /// Human-readable explanation
    pub reason: String,
}

impl Availability {
    fn admitted(remaining: Option<u32>) -> Self {
        Self {
            admitted: true,
            remaining,
            reason: "Available".to_string(),
        }
    }

    fn rejected(remaining: u32, reason: String) -> Self {
        Self {
            admitted: false,
            remaining: Some(remaining),
            reason,
        }
    }
}

/// Composes ledger figures into an admission decision.
#[derive(Clone, Copy, Debug, Default)]
pub struct AvailabilityChecker;

impl AvailabilityChecker {
    /// Decide `request` against `snapshot`.
    #[must_use]
    pub fn check(snapshot: &LedgerSnapshot, request: &AdmissionRequest) -> Availability {
        let demand = request.demand();
        let mut remaining = None;

        if let (Some(element), Some(_)) = (&snapshot.element, snapshot.element_holder) {
            return Availability::rejected(0, format!("{} is already taken", element.label));
        }

        if let (Some(category), Some(left)) = (&snapshot.category, snapshot.category_remaining()) {
            if left < demand {
                return Availability::rejected(
                    left,
                    format!("Only {left} left in category {}", category.name),
                );
            }
            remaining = Some(left);
        }

        if request.kind == BookingKind::Reservation {
            if let Some(left) = snapshot.event_remaining() {
                if left < demand {
                    return Availability::rejected(
                        left,
                        format!("Only {left} places left for {}", snapshot.event.name),
                    );
                }
                remaining = Some(left);
            }
        }

        Availability::admitted(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookingId, Category, ElementKind, Event, FloorPlanElement, FloorPlanId};
    use proptest::prelude::*;

    fn request(event: &Event, kind: BookingKind, quantity: u32) -> AdmissionRequest {
        AdmissionRequest {
            event_id: event.id,
            kind,
            quantity,
            guests: quantity,
            category_id: None,
            element_id: None,
        }
    }

    fn snapshot(event: Event) -> LedgerSnapshot {
        LedgerSnapshot {
            event,
            category: None,
            element: None,
            element_holder: None,
            reserved_guests: 0,
        }
    }

    #[test]
    fn test_unconstrained_request_is_admitted() {
        let event = Event::new("Open air");
        let verdict = AvailabilityChecker::check(
            &snapshot(event.clone()),
            &request(&event, BookingKind::Reservation, 500),
        );

        assert!(verdict.admitted);
        assert_eq!(verdict.remaining, None);
        assert_eq!(verdict.reason, "Available");
    }

    #[test]
    fn test_sold_out_category_rejects() {
        let event = Event::new("Concert");
        let mut category = Category::new(event.id, "Balcony");
        category.capacity = Some(5);
        category.sold = 5;
        let mut snap = snapshot(event.clone());
        snap.category = Some(category);

        let verdict = AvailabilityChecker::check(&snap, &request(&event, BookingKind::Ticket, 1));
        assert!(!verdict.admitted);
        assert_eq!(verdict.remaining, Some(0));
    }

    #[test]
    fn test_taken_element_short_circuits() {
        let mut event = Event::new("Dinner");
        event.capacity = Some(100);
        let element = FloorPlanElement {
            id: ElementId::new(),
            floor_plan_id: FloorPlanId::new(),
            event_id: event.id,
            label: "Table 7".into(),
            kind: ElementKind::Table,
            seats: 6,
        };
        let mut snap = snapshot(event.clone());
        snap.element = Some(element);
        snap.element_holder = Some(BookingId::new());

        let verdict =
            AvailabilityChecker::check(&snap, &request(&event, BookingKind::Reservation, 2));
        assert!(!verdict.admitted);
        assert_eq!(verdict.remaining, Some(0));
        assert!(verdict.reason.contains("Table 7 is already taken"));
    }

    #[test]
    fn test_event_remaining_wins_when_both_levels_pass() {
        let mut event = Event::new("Dinner");
        event.capacity = Some(10);
        let mut category = Category::new(event.id, "Standard");
        category.capacity = Some(50);
        let mut snap = snapshot(event.clone());
        snap.category = Some(category);
        snap.reserved_guests = 7;

        let verdict =
            AvailabilityChecker::check(&snap, &request(&event, BookingKind::Reservation, 3));
        assert!(verdict.admitted);
        assert_eq!(verdict.remaining, Some(3));

        let verdict =
            AvailabilityChecker::check(&snap, &request(&event, BookingKind::Reservation, 4));
        assert!(!verdict.admitted);
        assert_eq!(verdict.remaining, Some(3));
    }

    #[test]
    fn test_tickets_ignore_event_capacity() {
        let mut event = Event::new("Festival");
        event.capacity = Some(1);
        let mut snap = snapshot(event.clone());
        snap.reserved_guests = 1;

        let verdict = AvailabilityChecker::check(&snap, &request(&event, BookingKind::Ticket, 4));
        assert!(verdict.admitted);
    }

    proptest! {
        #[test]
        fn prop_admitted_demand_never_exceeds_capacity(
            event_capacity in 1u32..40,
            category_capacity in 1u32..40,
            requests in prop::collection::vec((any::<bool>(), 1u32..8), 1..30),
        ) {
            let mut event = Event::new("Gala");
            event.capacity = Some(event_capacity);
            let mut category = Category::new(event.id, "Floor");
            category.capacity = Some(category_capacity);
            let mut snap = snapshot(event.clone());
            snap.category = Some(category);

            for (is_ticket, quantity) in requests {
                let kind = if is_ticket { BookingKind::Ticket } else { BookingKind::Reservation };
                let verdict = AvailabilityChecker::check(&snap, &request(&event, kind, quantity));
                if verdict.admitted {
                    if let Some(category) = snap.category.as_mut() {
                        category.sold += quantity;
                    }
                    if kind == BookingKind::Reservation {
                        snap.reserved_guests += quantity;
                    }
                }
                prop_assert!(snap.reserved_guests <= event_capacity);
                prop_assert!(snap.category.as_ref().is_some_and(|c| c.sold <= category_capacity));
            }
        }
    }
}
