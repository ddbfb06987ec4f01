//! HTTP surface over the in-memory store.

#![cfg(feature = "http")]
#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::Harness;
use seatkeeper::api::{AppState, build_router};
use seatkeeper::store::InMemoryStore;
use seatkeeper::Event;
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(harness: &Harness<InMemoryStore>) -> Router {
    build_router(AppState::new(
        harness.bookings.clone(),
        harness.usage.clone(),
    ))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        },
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn booking_body(event: &Event, name: &str) -> Value {
    json!({
        "event_id": event.id,
        "type": "reservation",
        "guests": 2,
        "customer_name": name,
        "customer_email": format!("{}@example.com", name.to_lowercase()),
    })
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::in_memory();
    let (status, body) = send(&app(&harness), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_booking_round_trip_over_http() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let app = app(&harness);

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Alice")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["outcome"], "booked");
    let code = created["booking"]["confirmation_code"].as_str().unwrap().to_string();
    let token = created["booking"]["cancel_token"].as_str().unwrap().to_string();
    assert!(created["booking"]["check_in_url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("code={code}")));

    // Lookups never reveal the token.
    let (status, fetched) = send(&app, Method::GET, &format!("/api/bookings/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["customer"]["name"], "Alice");
    assert!(fetched.get("cancel_token").is_none());

    let (status, checked) = send(
        &app,
        Method::POST,
        &format!("/api/check-in/{code}"),
        Some(json!({ "actor": "door-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checked["already_checked_in"], false);
    assert_eq!(checked["booking"]["status"], "checked_in");

    let (status, again) = send(&app, Method::POST, &format!("/api/check-in/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["already_checked_in"], true);

    let (status, refused) = send(
        &app,
        Method::POST,
        "/api/bookings/cancel",
        Some(json!({ "confirmation_code": code, "cancel_token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(refused["code"], "CONFLICT");
}

#[tokio::test]
async fn test_error_bodies_carry_codes_and_details() {
    let harness = Harness::in_memory();
    let event = harness.event(Some(2), false).await;
    let app = app(&harness);

    let (status, body) = send(&app, Method::POST, "/api/bookings", Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let fields: Vec<_> = body["details"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap().to_string())
        .collect();
    assert!(fields.contains(&"customer_email".to_string()));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Alice")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Bob")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CAPACITY_EXCEEDED");
    assert_eq!(body["details"]["remaining"], 0);
    assert_eq!(body["details"]["waitlist_open"], false);

    let (status, body) = send(&app, Method::GET, "/api/bookings/NOPE2345", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_wrong_token_is_forbidden() {
    let harness = Harness::in_memory();
    let event = harness.event(None, false).await;
    let app = app(&harness);

    let (_, created) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Alice")),
    )
    .await;
    let code = created["booking"]["confirmation_code"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings/cancel",
        Some(json!({ "code": code, "token": "guess" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "TOKEN_ERROR");
}

#[tokio::test]
async fn test_full_event_with_waitlist_answers_accepted() {
    let harness = Harness::in_memory();
    let event = harness.event(Some(2), true).await;
    let app = app(&harness);

    send(&app, Method::POST, "/api/bookings", Some(booking_body(&event, "Alice"))).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Bob")),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "waitlisted");
    assert_eq!(body["entry"]["position"], 1);

    let (status, queue) = send(
        &app,
        Method::GET,
        &format!("/api/events/{}/waitlist", event.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_listing_and_availability_queries() {
    let harness = Harness::in_memory();
    let event = harness.event(Some(10), false).await;
    let app = app(&harness);

    for name in ["Alice", "Bob", "Carol"] {
        send(&app, Method::POST, "/api/bookings", Some(booking_body(&event, name))).await;
    }

    let (status, page) = send(
        &app,
        Method::GET,
        &format!(
            "/api/events/{}/bookings?status=pending&sort=customer_name&order=desc&limit=2",
            event.id
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"][0]["customer"]["name"], "Carol");
    assert!(page["items"][0].get("cancel_token").is_none());

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/events/{}/bookings?sort=password", event.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["fields"][0]["field"], "sort");

    let (status, availability) = send(
        &app,
        Method::GET,
        &format!("/api/events/{}/availability?guests=4", event.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["admitted"], true);
    assert_eq!(availability["remaining"], 4);
}

#[tokio::test]
async fn test_redeem_over_http() {
    let harness = Harness::in_memory();
    let event = harness.open_event().await;
    let coupon = harness.credential(Some(1), None).await;
    let app = app(&harness);

    let (_, created) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Alice")),
    )
    .await;
    let booking_id = created["booking"]["id"].clone();

    let uri = format!("/api/credentials/{}/redeem", coupon.id);
    let (status, record) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "booking_id": booking_id, "email": "alice@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["user"], "email:alice@example.com");

    let (_, second) = send(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body(&event, "Bob")),
    )
    .await;
    let (status, body) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "booking_id": second["booking"]["id"], "email": "bob@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "USAGE_LIMIT");
}
