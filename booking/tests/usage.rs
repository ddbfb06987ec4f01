//! Coupon and pass ceilings.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

mod common;

use common::{Harness, request};
use seatkeeper::{BookingError, BookingStore, CredentialId, ErrorKind, Redemption, UserId};

fn by_email(booking_id: seatkeeper::BookingId, email: &str) -> Redemption {
    Redemption {
        booking_id,
        user_id: None,
        email: Some(email.to_string()),
        discount_cents: 500,
    }
}

#[tokio::test]
async fn test_global_ceiling_stops_the_next_use() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let coupon = harness.credential(Some(2), None).await;

    for name in ["Alice", "Bob"] {
        let booking = harness.book(request(&event, name)).await;
        harness
            .usage
            .redeem(coupon.id, by_email(booking.id, &booking.customer.email))
            .await
            .unwrap();
    }

    let late = harness.book(request(&event, "Carol")).await;
    let err = harness
        .usage
        .redeem(coupon.id, by_email(late.id, "carol@example.com"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::UsageLimit {
            scope: "global",
            limit: 2
        }
    );

    let stored = harness.store.get_credential(coupon.id).await.unwrap().unwrap();
    assert_eq!(stored.used, 2);
}

#[tokio::test]
async fn test_per_user_ceiling_ignores_email_case() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let pass = harness.credential(None, Some(1)).await;

    let first = harness.book(request(&event, "Alice")).await;
    let record = harness
        .usage
        .redeem(pass.id, by_email(first.id, "Alice@Example.com"))
        .await
        .unwrap();
    assert_eq!(record.user.as_str(), "email:alice@example.com");
    assert_eq!(record.discount.cents(), 500);

    let second = harness.book(request(&event, "Alice")).await;
    let err = harness
        .usage
        .redeem(pass.id, by_email(second.id, "alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BookingError::UsageLimit {
            scope: "per_user",
            limit: 1
        }
    );

    // Someone else still may.
    let other = harness.book(request(&event, "Bob")).await;
    harness
        .usage
        .redeem(pass.id, by_email(other.id, "bob@example.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_identity_falls_back_to_the_booking() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let coupon = harness.credential(None, None).await;
    let user_id = UserId::new();

    let booking = harness
        .book(seatkeeper::NewBooking {
            user_id: Some(user_id),
            ..request(&event, "Alice")
        })
        .await;
    let record = harness
        .usage
        .redeem(
            coupon.id,
            Redemption {
                booking_id: booking.id,
                user_id: None,
                email: None,
                discount_cents: 0,
            },
        )
        .await
        .unwrap();

    assert_eq!(record.user.as_str(), format!("user:{user_id}"));
    assert!(harness.notifier.names().contains(&"usage_recorded"));
}

#[tokio::test]
async fn test_credential_applies_once_per_booking() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let coupon = harness.credential(Some(0), None).await;
    let booking = harness.book(request(&event, "Alice")).await;

    harness
        .usage
        .redeem(coupon.id, by_email(booking.id, "alice@example.com"))
        .await
        .unwrap();
    let err = harness
        .usage
        .redeem(coupon.id, by_email(booking.id, "alice@example.com"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(harness.store.usage_records().len(), 1);
}

#[tokio::test]
async fn test_unknown_and_inactive_credentials_are_refused() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let booking = harness.book(request(&event, "Alice")).await;

    let err = harness
        .usage
        .redeem(CredentialId::new(), by_email(booking.id, "alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut retired = harness.credential(None, None).await;
    retired.active = false;
    harness.store.save_credential(&retired).await.unwrap();
    let err = harness
        .usage
        .redeem(retired.id, by_email(booking.id, "alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
