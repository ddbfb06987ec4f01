//! Check-in and token-authorized cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

mod common;

use chrono::Duration;
use common::{Harness, request};
use seatkeeper::config::Config;
use seatkeeper::{BookingError, BookingKey, BookingStatus, ErrorKind, TokenError};
use std::collections::HashSet;

#[tokio::test]
async fn test_check_in_is_idempotent() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let booking = harness.book(request(&event, "Alice")).await;
    let key = BookingKey::Code(booking.confirmation_code.clone());

    let first = harness
        .bookings
        .check_in(&key, Some("door-1".into()))
        .await
        .unwrap();
    assert!(!first.already_checked_in);
    assert_eq!(first.booking.status, BookingStatus::CheckedIn);
    assert_eq!(first.booking.checked_in_by.as_deref(), Some("door-1"));
    let checked_in_at = first.booking.checked_in_at.unwrap();

    harness.clock.advance(Duration::minutes(5));
    let second = harness
        .bookings
        .check_in(&key, Some("door-2".into()))
        .await
        .unwrap();
    assert!(second.already_checked_in);
    assert_eq!(second.booking.checked_in_at, Some(checked_in_at));
    assert_eq!(second.booking.checked_in_by.as_deref(), Some("door-1"));

    let checked_in = harness
        .notifier
        .names()
        .into_iter()
        .filter(|name| *name == "checked_in")
        .count();
    assert_eq!(checked_in, 1);
}

#[tokio::test]
async fn test_pending_and_cancelled_bookings_cannot_check_in() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let pending = harness.book(request(&event, "Alice")).await;

    let err = harness
        .bookings
        .check_in(&BookingKey::Id(pending.id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    harness.bookings.cancel(pending.id, None).await.unwrap();
    let err = harness
        .bookings
        .check_in(&BookingKey::Id(pending.id), None)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::AlreadyCancelled);
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let harness = Harness::in_memory();

    let err = harness
        .bookings
        .check_in(&"ZZZZ9999".parse().unwrap(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_wrong_token_leaves_the_booking_alone() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let booking = harness.book(request(&event, "Alice")).await;

    let err = harness
        .bookings
        .verify_cancellation(&booking.confirmation_code, "not-the-token", None)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::Token(TokenError::Mismatch));

    let stored = harness
        .bookings
        .get_booking(&BookingKey::Id(booking.id))
        .await
        .unwrap();
    assert_eq!(stored.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_expired_token_is_refused() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let booking = harness.book(request(&event, "Alice")).await;

    harness.clock.advance(Duration::days(8));
    let err = harness
        .bookings
        .verify_cancellation(
            &booking.confirmation_code,
            booking.cancel_token.expose(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::Token(TokenError::Expired));
}

#[tokio::test]
async fn test_valid_token_cancels_once() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let booking = harness.book(request(&event, "Alice")).await;
    let token = booking.cancel_token.expose().to_string();

    let cancelled = harness
        .bookings
        .verify_cancellation(&booking.confirmation_code, &token, Some("plans changed".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let err = harness
        .bookings
        .verify_cancellation(&booking.confirmation_code, &token, None)
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::AlreadyCancelled);
}

#[tokio::test]
async fn test_checked_in_booking_cannot_be_cancelled_by_token() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let booking = harness.book(request(&event, "Alice")).await;
    harness
        .bookings
        .check_in(&BookingKey::Id(booking.id), None)
        .await
        .unwrap();

    let err = harness
        .bookings
        .verify_cancellation(
            &booking.confirmation_code,
            booking.cancel_token.expose(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            from: BookingStatus::CheckedIn,
            to: BookingStatus::Cancelled,
        }
    ));
}

#[tokio::test]
async fn test_codes_and_tokens_are_unique() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;

    let mut codes = HashSet::new();
    let mut tokens = HashSet::new();
    for i in 0..50 {
        let booking = harness.book(request(&event, &format!("Guest{i}"))).await;
        assert!(codes.insert(booking.confirmation_code.as_str().to_string()));
        assert!(tokens.insert(booking.cancel_token.expose().to_string()));
    }
}

#[tokio::test]
async fn test_check_in_url_embeds_the_code() {
    let mut config = Config::default();
    config.booking.checkin_base_url = "https://door.example.com/scan".into();
    let harness = Harness::in_memory_with(&config);
    let event = harness.open_event().await;
    let booking = harness.book(request(&event, "Alice")).await;

    assert_eq!(
        harness.bookings.check_in_url(&booking.confirmation_code),
        format!(
            "https://door.example.com/scan?code={}",
            booking.confirmation_code
        )
    );
}
