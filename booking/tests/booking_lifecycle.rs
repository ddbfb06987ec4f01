//! Admission, lifecycle and listing against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

mod common;

use common::{Harness, request};
use seatkeeper::{
    AvailabilityQuery, BookingError, BookingKey, BookingKind, BookingQuery, BookingStatus,
    BookingStore, ErrorKind, NewBooking, SortKey, SortOrder,
};

// ============================================================================
// Atomic admission
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_last_places_admit_exactly_one() {
    let harness = Harness::in_memory();
    let event = harness.event(Some(2), false).await;

    let first = {
        let bookings = harness.bookings.clone();
        let req = NewBooking {
            quantity: Some(2),
            ..request(&event, "Alice")
        };
        tokio::spawn(async move { bookings.create_booking(req).await })
    };
    let second = {
        let bookings = harness.bookings.clone();
        let req = NewBooking {
            quantity: Some(2),
            ..request(&event, "Bob")
        };
        tokio::spawn(async move { bookings.create_booking(req).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1, "exactly one request may take the last places");

    let refusal = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        refusal,
        BookingError::CapacityExceeded {
            remaining: Some(0),
            waitlist_open: false,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_category_never_oversells_under_contention() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let category = harness.category(&event, Some(10), 0).await;

    let handles: Vec<_> = (0..25)
        .map(|i| {
            let bookings = harness.bookings.clone();
            let req = NewBooking {
                kind: Some(BookingKind::Ticket),
                category_id: Some(category.id),
                ..request(&event, &format!("Guest{i}"))
            };
            tokio::spawn(async move { bookings.create_booking(req).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::CapacityExceeded),
        }
    }
    assert_eq!(admitted, 10);

    let stored = harness.store.get_category(category.id).await.unwrap().unwrap();
    assert_eq!(stored.sold, 10);
}

#[tokio::test]
async fn test_sold_out_category_reports_zero_remaining() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let category = harness.category(&event, Some(5), 5).await;

    let availability = harness
        .bookings
        .check_availability(
            event.id,
            AvailabilityQuery {
                kind: Some(BookingKind::Ticket),
                quantity: Some(1),
                category_id: Some(category.id),
                ..AvailabilityQuery::default()
            },
        )
        .await
        .unwrap();

    assert!(!availability.admitted);
    assert_eq!(availability.remaining, Some(0));
}

#[tokio::test]
async fn test_availability_rejects_references_to_another_event() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let other = harness.event(None, false).await;
    let foreign_category = harness.category(&other, Some(5), 0).await;
    let foreign_table = harness.element(&other, "Table 1", 4).await;

    let err = harness
        .bookings
        .check_availability(
            event.id,
            AvailabilityQuery {
                kind: Some(BookingKind::Ticket),
                category_id: Some(foreign_category.id),
                element_id: Some(foreign_table.id),
                ..AvailabilityQuery::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        BookingError::Validation(errors) if errors.has("category_id") && errors.has("element_id")
    ));

    let err = harness
        .bookings
        .check_availability(
            event.id,
            AvailabilityQuery {
                category_id: Some(seatkeeper::CategoryId::new()),
                ..AvailabilityQuery::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_held_element_is_refused_even_with_spare_capacity() {
    let harness = Harness::in_memory();
    let event = harness.event(Some(100), false).await;
    let table = harness.element(&event, "Table 7", 4).await;

    harness
        .book(NewBooking {
            element_id: Some(table.id),
            guests: Some(2),
            ..request(&event, "Alice")
        })
        .await;

    let availability = harness
        .bookings
        .check_availability(
            event.id,
            AvailabilityQuery {
                element_id: Some(table.id),
                ..AvailabilityQuery::default()
            },
        )
        .await
        .unwrap();
    assert!(!availability.admitted);
    assert!(availability.reason.contains("Table 7 is already taken"));

    let err = harness
        .bookings
        .create_booking(NewBooking {
            element_id: Some(table.id),
            ..request(&event, "Bob")
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::CapacityExceeded { ref reason, .. } if reason.contains("already taken")
    ));
}

#[tokio::test]
async fn test_cancelling_frees_the_element() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let table = harness.element(&event, "Booth 2", 6).await;

    let first = harness
        .book(NewBooking {
            element_id: Some(table.id),
            ..request(&event, "Alice")
        })
        .await;
    harness.bookings.cancel(first.id, None).await.unwrap();

    let second = harness
        .book(NewBooking {
            element_id: Some(table.id),
            ..request(&event, "Bob")
        })
        .await;
    assert_eq!(second.element_label.as_deref(), Some("Booth 2"));
}

#[tokio::test]
async fn test_tickets_do_not_draw_on_reservation_capacity() {
    let harness = Harness::in_memory();
    let event = harness.event(Some(2), false).await;

    let ticket = harness
        .book(NewBooking {
            kind: Some(BookingKind::Ticket),
            quantity: Some(5),
            ..request(&event, "Alice")
        })
        .await;
    assert_eq!(ticket.quantity, 5);

    harness
        .book(NewBooking {
            guests: Some(2),
            ..request(&event, "Bob")
        })
        .await;
}

// ============================================================================
// Validation and defaults
// ============================================================================

#[tokio::test]
async fn test_validation_reports_every_missing_field() {
    let harness = Harness::in_memory();

    let err = harness
        .bookings
        .create_booking(NewBooking::default())
        .await
        .unwrap_err();

    assert!(
        matches!(
            &err,
            BookingError::Validation(errors)
                if errors.has("customer_name") && errors.has("customer_email") && errors.has("event_id")
        ),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_malformed_email_and_zero_quantity_are_rejected() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;

    let err = harness
        .bookings
        .create_booking(NewBooking {
            customer_email: Some("not-an-email".into()),
            quantity: Some(0),
            ..request(&event, "Alice")
        })
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        BookingError::Validation(errors) if errors.has("customer_email") && errors.has("quantity")
    ));
}

#[tokio::test]
async fn test_party_larger_than_element_is_rejected() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let table = harness.element(&event, "Table 1", 2).await;

    let err = harness
        .bookings
        .create_booking(NewBooking {
            element_id: Some(table.id),
            guests: Some(5),
            ..request(&event, "Alice")
        })
        .await
        .unwrap_err();

    assert!(matches!(&err, BookingError::Validation(errors) if errors.has("guests")));
}

#[tokio::test]
async fn test_new_booking_defaults() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let category = harness.category(&event, None, 0).await;

    let booking = harness
        .book(NewBooking {
            kind: Some(BookingKind::Ticket),
            category_id: Some(category.id),
            quantity: Some(3),
            ..request(&event, "Alice")
        })
        .await;

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.guests, 3);
    assert_eq!(booking.price.cents(), 7_500);
    assert_eq!(booking.currency, "EUR");
    assert_eq!(booking.confirmation_code.as_str().len(), 8);
    assert_eq!(harness.notifier.names(), vec!["booking_created"]);
}

#[tokio::test]
async fn test_auto_confirming_event_starts_confirmed() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;

    let booking = harness.book(request(&event, "Alice")).await;

    assert_eq!(booking.kind, BookingKind::Reservation);
    assert_eq!(booking.status, BookingStatus::Confirmed);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_status_follows_the_transition_table() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let booking = harness.book(request(&event, "Alice")).await;

    let confirmed = harness
        .bookings
        .update_status(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    let err = harness
        .bookings
        .update_status(booking.id, BookingStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            from: BookingStatus::Confirmed,
            to: BookingStatus::Pending,
        }
    ));

    harness.bookings.cancel(booking.id, Some("duplicate".into())).await.unwrap();
    let err = harness.bookings.cancel(booking.id, None).await.unwrap_err();
    assert_eq!(err, BookingError::AlreadyCancelled);

    let stored = harness
        .bookings
        .get_booking(&BookingKey::Id(booking.id))
        .await
        .unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert!(stored.internal_notes.unwrap_or_default().contains("duplicate"));
}

#[tokio::test]
async fn test_cancel_returns_category_units() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let category = harness.category(&event, Some(4), 0).await;

    let booking = harness
        .book(NewBooking {
            kind: Some(BookingKind::Ticket),
            category_id: Some(category.id),
            quantity: Some(3),
            ..request(&event, "Alice")
        })
        .await;
    let stored = harness.store.get_category(category.id).await.unwrap().unwrap();
    assert_eq!(stored.sold, 3);

    harness.bookings.cancel(booking.id, None).await.unwrap();
    let stored = harness.store.get_category(category.id).await.unwrap().unwrap();
    assert_eq!(stored.sold, 0);
}

#[tokio::test]
async fn test_delete_retires_the_confirmation_code() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let booking = harness.book(request(&event, "Alice")).await;

    harness.bookings.delete_booking(booking.id).await.unwrap();

    let err = harness
        .bookings
        .get_booking(&BookingKey::Code(booking.confirmation_code.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = harness.bookings.delete_booking(booking.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_lookup_by_code_and_by_id_agree() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let booking = harness.book(request(&event, "Alice")).await;

    let by_code: BookingKey = booking.confirmation_code.as_str().parse().unwrap();
    let by_id: BookingKey = booking.id.to_string().parse().unwrap();

    assert_eq!(
        harness.bookings.get_booking(&by_code).await.unwrap(),
        harness.bookings.get_booking(&by_id).await.unwrap()
    );
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_listing_filters_sorts_and_pages() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let other = harness.event(None, false).await;

    for name in ["Charlie", "Alice", "Bob", "Dana"] {
        harness.book(request(&event, name)).await;
    }
    harness.book(request(&other, "Alicia")).await;
    let cancelled = harness.book(request(&event, "Eve")).await;
    harness.bookings.cancel(cancelled.id, None).await.unwrap();

    let page = harness
        .bookings
        .list_bookings(
            event.id,
            &BookingQuery {
                status: Some(BookingStatus::Pending),
                sort: SortKey::CustomerName,
                order: SortOrder::Asc,
                limit: Some(2),
                offset: Some(1),
                ..BookingQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    let names: Vec<_> = page.items.iter().map(|b| b.customer.name.as_str()).collect();
    assert_eq!(names, vec!["Bob", "Charlie"]);

    let page = harness
        .bookings
        .list_bookings(
            event.id,
            &BookingQuery {
                search: Some("ALI".into()),
                ..BookingQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].customer.name, "Alice");
}

#[tokio::test]
async fn test_offset_past_the_end_returns_an_empty_page() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    harness.book(request(&event, "Alice")).await;

    let page = harness
        .bookings
        .list_bookings(
            event.id,
            &BookingQuery {
                offset: Some(u32::MAX),
                ..BookingQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert!(page.items.is_empty());
    assert_eq!(page.offset, u32::MAX);
}

#[tokio::test]
async fn test_listing_unknown_event_is_not_found() {
    let harness = Harness::in_memory();

    let err = harness
        .bookings
        .list_bookings(seatkeeper::EventId::new(), &BookingQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
