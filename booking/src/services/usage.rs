//! Coupon and pass usage tracking.

use crate::error::{BookingError, ErrorKind, Result};
use crate::metrics;
use crate::notify::{DomainEvent, Notifier, deliver};
use crate::store::BookingStore;
use crate::types::{
    BookingId, CredentialId, Money, UsageId, UsageRecord, UserId, UserIdentity,
};
use seatkeeper_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request to apply a coupon or pass to a booking.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Redemption {
    /// Booking the credential is applied to
    pub booking_id: BookingId,
    /// Registered user redeeming, if any
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Guest email redeeming, if no user id
    #[serde(default)]
    pub email: Option<String>,
    /// Discount granted, in cents
    #[serde(default)]
    pub discount_cents: u64,
}

/// Records coupon and pass uses against their ceilings.
pub struct UsageTracker<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
}

impl<S, N> Clone for UsageTracker<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: BookingStore, N: Notifier> UsageTracker<S, N> {
    /// Creates a new `UsageTracker`
    #[must_use]
    pub fn new(store: Arc<S>, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Record one use of `credential_id` on a booking.
    ///
    /// The per-user ceiling is counted against the user id when given, else
    /// the email, else the booking's own user or customer email.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown credential or booking
    /// - `Validation` for an inactive credential
    /// - `Conflict` when the credential was already applied to the booking
    /// - `UsageLimit` when the global or per-user ceiling is reached
    #[tracing::instrument(skip(self, redemption), fields(booking_id = %redemption.booking_id))]
    pub async fn redeem(
        &self,
        credential_id: CredentialId,
        redemption: Redemption,
    ) -> Result<UsageRecord> {
        let user = self.identity(&redemption).await?;
        let record = UsageRecord {
            id: UsageId::new(),
            credential_id,
            booking_id: redemption.booking_id,
            user,
            discount: Money::from_cents(redemption.discount_cents),
            recorded_at: self.clock.now(),
        };

        match self.store.redeem_usage(record).await {
            Ok(record) => {
                metrics::record_usage("recorded");
                tracing::info!(usage_id = %record.id, user = record.user.as_str(), "Usage recorded");
                deliver(
                    &*self.notifier,
                    DomainEvent::UsageRecorded {
                        record: record.clone(),
                    },
                )
                .await;
                Ok(record)
            },
            Err(error) => {
                if error.kind() == ErrorKind::UsageLimit {
                    metrics::record_usage("limited");
                }
                tracing::warn!(%error, "Usage refused");
                Err(error)
            },
        }
    }

    async fn identity(&self, redemption: &Redemption) -> Result<UserIdentity> {
        if let Some(user_id) = redemption.user_id {
            return Ok(UserIdentity::user(user_id));
        }
        if let Some(email) = redemption.email.as_deref().filter(|e| !e.trim().is_empty()) {
            return Ok(UserIdentity::email(email));
        }

        let booking = self
            .store
            .get_booking(redemption.booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", redemption.booking_id))?;
        Ok(booking.user_id.map_or_else(
            || UserIdentity::email(&booking.customer.email),
            UserIdentity::user,
        ))
    }
}
