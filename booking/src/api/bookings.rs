//! Booking endpoints.
//!
//! Booking bodies carry a `check_in_url` for QR rendering. The cancel token
//! is only ever returned to whoever created the booking.

use super::error::AppError;
use super::state::AppState;
use crate::availability::Availability;
use crate::error::{BookingError, ValidationErrors};
use crate::notify::Notifier;
use crate::query::{BookingQuery, Page};
use crate::services::{AvailabilityQuery, BookingKey, CheckInOutcome, NewBooking, Submission};
use crate::store::BookingStore;
use crate::types::{Booking, BookingId, BookingStatus, ConfirmationCode, EventId};
use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fmt::Display;
use std::str::FromStr;

// ============================================================================
// Request Types
// ============================================================================

/// Body of a status change.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status
    pub status: BookingStatus,
}

/// Body of an administrative cancel.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CancelRequest {
    /// Appended to the internal notes
    pub reason: Option<String>,
}

/// Body of a self-service cancel.
#[derive(Debug, Deserialize)]
pub struct TokenCancelRequest {
    /// Public confirmation code
    #[serde(alias = "code")]
    pub confirmation_code: String,
    /// Cancel token issued at booking time
    #[serde(alias = "token")]
    pub cancel_token: String,
    /// Appended to the internal notes
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of a check-in.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckInRequest {
    /// Staff member or device performing the check-in
    pub actor: Option<String>,
}

/// Listing query string.
///
/// Kept as raw strings so that bad values come back as field errors.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Status filter
    pub status: Option<String>,
    /// Type filter
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<String>,
    /// Payment status filter
    pub payment_status: Option<String>,
    /// Search on name, email or code
    pub search: Option<String>,
    /// Page size
    pub limit: Option<u32>,
    /// Rows to skip
    pub offset: Option<u32>,
    /// Sort key
    pub sort: Option<String>,
    /// Sort direction
    pub order: Option<String>,
}

fn parse_field<T>(errors: &mut ValidationErrors, field: &'static str, value: Option<&str>) -> Option<T>
where
    T: FromStr,
{
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    value.parse().map_or_else(
        |_| {
            errors.add(field, format!("unsupported value '{value}'"));
            None
        },
        Some,
    )
}

impl TryFrom<ListParams> for BookingQuery {
    type Error = BookingError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        let mut errors = ValidationErrors::new();
        let query = Self {
            status: parse_field(&mut errors, "status", params.status.as_deref()),
            kind: parse_field(&mut errors, "type", params.kind.as_deref()),
            payment_status: parse_field(
                &mut errors,
                "payment_status",
                params.payment_status.as_deref(),
            ),
            search: params.search,
            limit: params.limit,
            offset: params.offset,
            sort: parse_field(&mut errors, "sort", params.sort.as_deref()).unwrap_or_default(),
            order: parse_field(&mut errors, "order", params.order.as_deref()).unwrap_or_default(),
        };
        errors.into_result()?;
        Ok(query)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn encode(value: impl serde::Serialize, what: impl Display) -> Result<Value, AppError> {
    Ok(serde_json::to_value(value).with_context(|| format!("Failed to encode {what}"))?)
}

fn booking_body<S: BookingStore, N: Notifier>(
    state: &AppState<S, N>,
    booking: &Booking,
    reveal_token: bool,
) -> Result<Value, AppError> {
    let mut body = encode(booking, "booking")?;
    if let Value::Object(fields) = &mut body {
        if !reveal_token {
            fields.remove("cancel_token");
        }
        fields.insert(
            "check_in_url".to_string(),
            Value::String(state.bookings.check_in_url(&booking.confirmation_code)),
        );
    }
    Ok(body)
}

async fn resolve_id<S: BookingStore, N: Notifier>(
    state: &AppState<S, N>,
    key: &str,
) -> Result<BookingId, BookingError> {
    match key.parse::<BookingKey>()? {
        BookingKey::Id(id) => Ok(id),
        code @ BookingKey::Code(_) => Ok(state.bookings.get_booking(&code).await?.id),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Book, or join the waitlist when capacity is full.
///
/// Returns 201 with the booking (including its cancel token) or 202 with the
/// waitlist entry.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings \
///   -H "Content-Type: application/json" \
///   -d '{"event_id":"550e8400-e29b-41d4-a716-446655440000","type":"reservation",
///        "guests":2,"customer_name":"Alice","customer_email":"alice@example.com"}'
/// ```
pub async fn submit<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Json(request): Json<NewBooking>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    match state.bookings.submit(request).await? {
        Submission::Booked { booking } => {
            let body = booking_body(&state, &booking, true)?;
            Ok((
                StatusCode::CREATED,
                Json(json!({ "outcome": "booked", "booking": body })),
            ))
        },
        waitlisted @ Submission::Waitlisted { .. } => {
            Ok((StatusCode::ACCEPTED, Json(encode(waitlisted, "submission")?)))
        },
    }
}

/// Look a booking up by id or confirmation code.
///
/// ```bash
/// curl http://localhost:8080/api/bookings/K7M2XQ9P
/// ```
pub async fn get_booking<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let key: BookingKey = key.parse()?;
    let booking = state.bookings.get_booking(&key).await?;
    Ok(Json(booking_body(&state, &booking, false)?))
}

/// Move a booking to another status.
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/bookings/K7M2XQ9P/status \
///   -H "Content-Type: application/json" -d '{"status":"confirmed"}'
/// ```
pub async fn update_status<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(key): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Value>, AppError> {
    let id = resolve_id(&state, &key).await?;
    let booking = state.bookings.update_status(id, request.status).await?;
    Ok(Json(booking_body(&state, &booking, false)?))
}

/// Administrative cancel.
pub async fn cancel<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(key): Path<String>,
    request: Option<Json<CancelRequest>>,
) -> Result<Json<Value>, AppError> {
    let id = resolve_id(&state, &key).await?;
    let reason = request.and_then(|Json(r)| r.reason);
    let booking = state.bookings.cancel(id, reason).await?;
    Ok(Json(booking_body(&state, &booking, false)?))
}

/// Self-service cancel with the token issued at booking time.
///
/// A wrong or expired token answers 403 and leaves the booking untouched.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bookings/cancel \
///   -H "Content-Type: application/json" \
///   -d '{"confirmation_code":"K7M2XQ9P","cancel_token":"..."}'
/// ```
pub async fn cancel_with_token<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Json(request): Json<TokenCancelRequest>,
) -> Result<Json<Value>, AppError> {
    let code = ConfirmationCode::new(request.confirmation_code.trim());
    let booking = state
        .bookings
        .verify_cancellation(&code, &request.cancel_token, request.reason)
        .await?;
    Ok(Json(booking_body(&state, &booking, false)?))
}

/// Check a guest in by id or scanned confirmation code.
///
/// Repeating a check-in answers 200 with `already_checked_in: true`.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/check-in/K7M2XQ9P \
///   -H "Content-Type: application/json" -d '{"actor":"door-1"}'
/// ```
pub async fn check_in<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(key): Path<String>,
    request: Option<Json<CheckInRequest>>,
) -> Result<Json<Value>, AppError> {
    let key: BookingKey = key.parse()?;
    let actor = request.and_then(|Json(r)| r.actor);
    let CheckInOutcome {
        booking,
        already_checked_in,
    } = state.bookings.check_in(&key, actor).await?;
    Ok(Json(json!({
        "booking": booking_body(&state, &booking, false)?,
        "already_checked_in": already_checked_in,
    })))
}

/// Hard delete. The confirmation code is never handed out again.
pub async fn delete_booking<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = resolve_id(&state, &key).await?;
    let booking = state.bookings.delete_booking(id).await?;
    Ok(Json(booking_body(&state, &booking, false)?))
}

/// One page of an event's bookings.
///
/// ```bash
/// curl "http://localhost:8080/api/events/550e8400-e29b-41d4-a716-446655440000/bookings?status=confirmed&search=alice&sort=created_at&order=asc&limit=20"
/// ```
pub async fn list_bookings<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(event_id): Path<EventId>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Value>>, AppError> {
    let query = BookingQuery::try_from(params)?;
    let page = state.bookings.list_bookings(event_id, &query).await?;
    let items = page
        .items
        .iter()
        .map(|booking| booking_body(&state, booking, false))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(Page {
        items,
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// Would a request be admitted right now? Nothing is reserved.
///
/// ```bash
/// curl "http://localhost:8080/api/events/550e8400-e29b-41d4-a716-446655440000/availability?type=ticket&quantity=2&category_id=..."
/// ```
pub async fn check_availability<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(event_id): Path<EventId>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Availability>, AppError> {
    Ok(Json(state.bookings.check_availability(event_id, query).await?))
}
