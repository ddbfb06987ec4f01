//! Capacity ledger: how much of an element, a category or an event is consumed.
//!
//! Pure read-aggregation over booking records. Stores call these functions
//! while holding whatever lock makes the subsequent write atomic; the SQL
//! store computes the same figures with aggregate queries.

use crate::error::{BookingError, Result};
use crate::types::{
    Booking, BookingId, BookingKind, Category, CategoryId, ElementId, Event, EventId,
    FloorPlanElement, UsageCredential, WaitlistScope,
};

/// The booking currently holding `element_id` on `event_id`, if any.
///
/// Any non-cancelled booking holds its element, no-shows included.
pub fn element_holder<'a, I>(bookings: I, event_id: EventId, element_id: ElementId) -> Option<BookingId>
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings
        .into_iter()
        .find(|b| {
            b.event_id == event_id && b.element_id == Some(element_id) && b.status.holds_inventory()
        })
        .map(|b| b.id)
}

/// Guests seated by pending, confirmed or checked-in reservations on `event_id`.
pub fn reserved_guests<'a, I>(bookings: I, event_id: EventId) -> u32
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings
        .into_iter()
        .filter(|b| {
            b.event_id == event_id
                && b.kind == BookingKind::Reservation
                && b.status.holds_capacity()
        })
        .fold(0_u32, |sum, b| sum.saturating_add(b.guests))
}

/// Units of `category_id` consumed by capacity-holding bookings.
///
/// A category's `sold` counter should always equal this figure.
pub fn category_consumed<'a, I>(bookings: I, category_id: CategoryId) -> u32
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings
        .into_iter()
        .filter(|b| b.category_id == Some(category_id) && b.status.holds_inventory())
        .fold(0_u32, |sum, b| sum.saturating_add(b.capacity_demand()))
}

/// Checks one more use of `credential` against its ceilings.
///
/// `uses_by_user` counts the uses already recorded for the redeeming identity.
///
/// # Errors
///
/// Returns [`BookingError::UsageLimit`] naming the ceiling that would be exceeded.
pub fn check_usage_ceilings(credential: &UsageCredential, uses_by_user: u32) -> Result<()> {
    if let Some(limit) = credential.usage_limit.filter(|l| *l > 0) {
        if credential.used >= limit {
            return Err(BookingError::UsageLimit {
                scope: "global",
                limit,
            });
        }
    }
    if let Some(limit) = credential.per_user_limit.filter(|l| *l > 0) {
        if uses_by_user >= limit {
            return Err(BookingError::UsageLimit {
                scope: "per_user",
                limit,
            });
        }
    }
    Ok(())
}

/// Everything the availability checker needs to decide one request.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerSnapshot {
    /// The event being booked
    pub event: Event,
    /// Requested category, with its current `sold` counter
    pub category: Option<Category>,
    /// Requested floor-plan element
    pub element: Option<FloorPlanElement>,
    /// Booking currently holding the requested element
    pub element_holder: Option<BookingId>,
    /// Guests seated by capacity-holding reservations on the event
    pub reserved_guests: u32,
}

impl LedgerSnapshot {
    /// Aggregates a snapshot from in-memory records.
    #[must_use]
    pub fn build<'a, I>(
        event: Event,
        category: Option<Category>,
        element: Option<FloorPlanElement>,
        bookings: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a Booking> + Clone,
    {
        let element_holder = element
            .as_ref()
            .and_then(|e| element_holder(bookings.clone(), event.id, e.id));
        let reserved_guests = reserved_guests(bookings, event.id);

        Self {
            event,
            category,
            element,
            element_holder,
            reserved_guests,
        }
    }

    /// Guests still admissible at event level, `None` when unlimited.
    #[must_use]
    pub fn event_remaining(&self) -> Option<u32> {
        self.event
            .capacity_limit()
            .map(|capacity| capacity.saturating_sub(self.reserved_guests))
    }

    /// Units of `scope` free for waitlist offers, `None` when unlimited.
    ///
    /// The snapshot must have been taken for the scope's category or element.
    #[must_use]
    pub fn scope_remaining(&self, scope: WaitlistScope) -> Option<u32> {
        match scope {
            WaitlistScope::Element { .. } => Some(u32::from(self.element_holder.is_none())),
            WaitlistScope::Category { .. } => self.category_remaining(),
            WaitlistScope::Event { .. } => self.event_remaining(),
        }
    }

    /// Units still on sale in the requested category, `None` when unlimited.
    #[must_use]
    pub fn category_remaining(&self) -> Option<u32> {
        self.category.as_ref().and_then(|category| {
            category
                .capacity_limit()
                .map(|capacity| capacity.saturating_sub(category.sold))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookingStatus, CancelToken, ConfirmationCode, Customer, Money, PaymentStatus};
    use seatkeeper_testing::test_time;

    fn booking(event_id: EventId, kind: BookingKind, guests: u32, status: BookingStatus) -> Booking {
        Booking {
            id: BookingId::new(),
            event_id,
            user_id: None,
            kind,
            subtype: None,
            element_id: None,
            element_label: None,
            category_id: None,
            price: Money::default(),
            currency: "EUR".into(),
            payment_status: PaymentStatus::None,
            status,
            quantity: 1,
            guests,
            customer: Customer {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                phone: None,
            },
            customer_notes: None,
            internal_notes: None,
            payload: serde_json::Value::Null,
            confirmation_code: ConfirmationCode::new("ABCDEFGH"),
            cancel_token: CancelToken::new("t"),
            cancel_token_expires_at: test_time(),
            checked_in_at: None,
            checked_in_by: None,
            created_at: test_time(),
            updated_at: test_time(),
        }
    }

    #[test]
    fn test_reserved_guests_skips_cancelled_and_tickets() {
        let event_id = EventId::new();
        let bookings = [
            booking(event_id, BookingKind::Reservation, 3, BookingStatus::Confirmed),
            booking(event_id, BookingKind::Reservation, 2, BookingStatus::CheckedIn),
            booking(event_id, BookingKind::Reservation, 4, BookingStatus::Cancelled),
            booking(event_id, BookingKind::Ticket, 5, BookingStatus::Confirmed),
            booking(EventId::new(), BookingKind::Reservation, 7, BookingStatus::Pending),
        ];

        assert_eq!(reserved_guests(&bookings, event_id), 5);
    }

    #[test]
    fn test_cancelled_booking_releases_element() {
        let event_id = EventId::new();
        let element_id = ElementId::new();
        let mut held = booking(event_id, BookingKind::Reservation, 2, BookingStatus::Pending);
        held.element_id = Some(element_id);

        assert_eq!(element_holder([&held], event_id, element_id), Some(held.id));

        held.status = BookingStatus::Cancelled;
        assert_eq!(element_holder([&held], event_id, element_id), None);
    }

    #[test]
    fn test_category_consumption_uses_demand() {
        let event_id = EventId::new();
        let category_id = CategoryId::new();
        let mut ticket = booking(event_id, BookingKind::Ticket, 1, BookingStatus::Confirmed);
        ticket.quantity = 3;
        ticket.category_id = Some(category_id);
        let mut table = booking(event_id, BookingKind::Reservation, 4, BookingStatus::NoShow);
        table.category_id = Some(category_id);

        assert_eq!(category_consumed([&ticket, &table], category_id), 7);
    }

    #[test]
    fn test_no_show_frees_guests_but_keeps_inventory() {
        let event_id = EventId::new();
        let element_id = ElementId::new();
        let mut absent = booking(event_id, BookingKind::Reservation, 4, BookingStatus::NoShow);
        absent.element_id = Some(element_id);
        let seated = booking(event_id, BookingKind::Reservation, 2, BookingStatus::CheckedIn);

        assert_eq!(reserved_guests([&absent, &seated], event_id), 2);
        assert_eq!(element_holder([&absent], event_id, element_id), Some(absent.id));
    }

    #[test]
    fn test_usage_ceilings() {
        let mut credential = UsageCredential {
            id: crate::types::CredentialId::new(),
            kind: crate::types::CredentialKind::Coupon,
            code: "SPRING".into(),
            usage_limit: Some(3),
            per_user_limit: Some(1),
            used: 2,
            active: true,
        };
        assert!(check_usage_ceilings(&credential, 0).is_ok());
        assert_eq!(
            check_usage_ceilings(&credential, 1),
            Err(BookingError::UsageLimit {
                scope: "per_user",
                limit: 1
            })
        );
        credential.used = 3;
        assert_eq!(
            check_usage_ceilings(&credential, 0),
            Err(BookingError::UsageLimit {
                scope: "global",
                limit: 3
            })
        );
    }

    #[test]
    fn test_snapshot_remaining() {
        let mut event = Event::new("Gala");
        event.capacity = Some(10);
        let bookings = [booking(event.id, BookingKind::Reservation, 6, BookingStatus::Confirmed)];
        let mut category = Category::new(event.id, "VIP");
        category.capacity = Some(5);
        category.sold = 5;

        let snapshot = LedgerSnapshot::build(event, Some(category), None, &bookings);
        assert_eq!(snapshot.event_remaining(), Some(4));
        assert_eq!(snapshot.category_remaining(), Some(0));
        assert_eq!(
            snapshot.scope_remaining(WaitlistScope::Event {
                event_id: snapshot.event.id
            }),
            Some(4)
        );
    }
}
