//! Waitlist endpoints.

use super::error::AppError;
use super::state::AppState;
use crate::notify::Notifier;
use crate::services::{JoinWaitlist, SweepReport};
use crate::store::BookingStore;
use crate::types::{BookingId, CategoryId, ElementId, EventId, WaitlistEntry, WaitlistEntryId, WaitlistScope};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

/// Body of a conversion.
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    /// Booking that claimed the offer
    pub booking_id: BookingId,
}

/// Narrows a waitlist listing to one category or element.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScopeParams {
    /// Category queue
    pub category_id: Option<CategoryId>,
    /// Element queue; wins over the category
    pub element_id: Option<ElementId>,
}

/// Join a waitlist.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/waitlist \
///   -H "Content-Type: application/json" \
///   -d '{"event_id":"550e8400-e29b-41d4-a716-446655440000",
///        "customer_name":"Bob","customer_email":"bob@example.com"}'
/// ```
pub async fn join<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Json(request): Json<JoinWaitlist>,
) -> Result<(StatusCode, Json<WaitlistEntry>), AppError> {
    let entry = state.bookings.join_waitlist(request).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Claim a live offer with a booking made for the same event.
pub async fn convert<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(entry_id): Path<WaitlistEntryId>,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<WaitlistEntry>, AppError> {
    let entry = state
        .bookings
        .convert_waitlist_entry(entry_id, request.booking_id)
        .await?;
    Ok(Json(entry))
}

/// Expire lapsed offers and promote replacements.
///
/// Meant for a scheduler; safe to call at any frequency.
pub async fn sweep<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(state.bookings.sweep_waitlist().await?))
}

/// One scope's queue in position order.
///
/// ```bash
/// curl "http://localhost:8080/api/events/550e8400-e29b-41d4-a716-446655440000/waitlist?category_id=..."
/// ```
pub async fn list<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(event_id): Path<EventId>,
    Query(params): Query<ScopeParams>,
) -> Result<Json<Vec<WaitlistEntry>>, AppError> {
    let scope = WaitlistScope::resolve(event_id, params.category_id, params.element_id);
    Ok(Json(state.bookings.waitlist().entries(scope).await?))
}
