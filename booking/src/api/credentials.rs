//! Coupon and pass endpoints.

use super::error::AppError;
use super::state::AppState;
use crate::notify::Notifier;
use crate::services::Redemption;
use crate::store::BookingStore;
use crate::types::{CredentialId, UsageRecord};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// Record one use of a coupon or pass.
///
/// Answers 409 `USAGE_LIMIT` once the global or per-user ceiling is reached.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/credentials/6f1c.../redeem \
///   -H "Content-Type: application/json" \
///   -d '{"booking_id":"...","email":"alice@example.com","discount_cents":500}'
/// ```
pub async fn redeem<S: BookingStore, N: Notifier>(
    State(state): State<AppState<S, N>>,
    Path(credential_id): Path<CredentialId>,
    Json(redemption): Json<Redemption>,
) -> Result<(StatusCode, Json<UsageRecord>), AppError> {
    let record = state.usage.redeem(credential_id, redemption).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
