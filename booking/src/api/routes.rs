//! Router configuration.

use super::health::health_check;
use super::middleware::request_id_layer;
use super::state::AppState;
use super::{bookings, credentials, waitlist};
use crate::notify::Notifier;
use crate::store::BookingStore;
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the complete router.
///
/// | Method | Path | Operation |
/// |---|---|---|
/// | GET | `/health` | liveness |
/// | POST | `/api/bookings` | submit (book or waitlist) |
/// | GET | `/api/bookings/:key` | look up by id or confirmation code |
/// | DELETE | `/api/bookings/:key` | hard delete by id |
/// | PUT | `/api/bookings/:key/status` | status transition |
/// | POST | `/api/bookings/:key/cancel` | administrative cancel |
/// | POST | `/api/bookings/:key/check-in` | check in by id or code |
/// | POST | `/api/bookings/cancel` | self-service cancel with token |
/// | POST | `/api/check-in/:code` | check in by scanned code |
/// | GET | `/api/events/:id/bookings` | filtered, paginated listing |
/// | GET | `/api/events/:id/availability` | availability check |
/// | GET | `/api/events/:id/waitlist` | one scope's queue |
/// | POST | `/api/waitlist` | join a waitlist |
/// | POST | `/api/waitlist/sweep` | expire lapsed offers and promote |
/// | POST | `/api/waitlist/:id/convert` | claim an offer |
/// | POST | `/api/credentials/:id/redeem` | record a coupon or pass use |
pub fn build_router<S: BookingStore, N: Notifier>(state: AppState<S, N>) -> Router {
    let api_routes = Router::new()
        // Bookings
        .route("/bookings", post(bookings::submit::<S, N>))
        .route("/bookings/cancel", post(bookings::cancel_with_token::<S, N>))
        .route(
            "/bookings/:key",
            get(bookings::get_booking::<S, N>).delete(bookings::delete_booking::<S, N>),
        )
        .route("/bookings/:key/status", put(bookings::update_status::<S, N>))
        .route("/bookings/:key/cancel", post(bookings::cancel::<S, N>))
        .route("/bookings/:key/check-in", post(bookings::check_in::<S, N>))
        .route("/check-in/:key", post(bookings::check_in::<S, N>))
        // Per-event queries
        .route("/events/:id/bookings", get(bookings::list_bookings::<S, N>))
        .route(
            "/events/:id/availability",
            get(bookings::check_availability::<S, N>),
        )
        .route("/events/:id/waitlist", get(waitlist::list::<S, N>))
        // Waitlist
        .route("/waitlist", post(waitlist::join::<S, N>))
        .route("/waitlist/sweep", post(waitlist::sweep::<S, N>))
        .route("/waitlist/:id/convert", post(waitlist::convert::<S, N>))
        // Coupons and passes
        .route("/credentials/:id/redeem", post(credentials::redeem::<S, N>));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(request_id_layer())
        .with_state(state)
}
