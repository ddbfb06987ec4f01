//! Typed domain events and the notification collaborator.
//!
//! The core never assumes a subscriber exists. Delivery is fire-and-forget:
//! a failed delivery is logged at `warn` and never undoes the state change
//! that produced it.

use crate::types::{Booking, BookingId, BookingStatus, UsageRecord, WaitlistEntry};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;

/// Something that happened and that a notification channel may act on.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A booking was admitted and persisted.
    BookingCreated {
        /// The new booking
        booking: Booking,
    },
    /// A booking moved between lifecycle states.
    StatusChanged {
        /// The booking after the change
        booking: Booking,
        /// Previous status
        from: BookingStatus,
        /// New status
        to: BookingStatus,
    },
    /// A guest was checked in.
    CheckedIn {
        /// The booking after check-in
        booking: Booking,
    },
    /// Someone joined a waitlist.
    WaitlistJoined {
        /// The new entry
        entry: WaitlistEntry,
    },
    /// A waitlist entry received a time-boxed offer.
    WaitlistPromoted {
        /// The promoted entry
        entry: WaitlistEntry,
    },
    /// A waitlist offer lapsed unclaimed.
    WaitlistOfferExpired {
        /// The expired entry
        entry: WaitlistEntry,
    },
    /// A waitlist offer was claimed by a booking.
    WaitlistConverted {
        /// The converted entry
        entry: WaitlistEntry,
        /// Booking that claimed it
        booking_id: BookingId,
    },
    /// A coupon or pass use was recorded.
    UsageRecorded {
        /// The usage record
        record: UsageRecord,
    },
}

impl DomainEvent {
    /// Stable event name, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BookingCreated { .. } => "booking_created",
            Self::StatusChanged { .. } => "status_changed",
            Self::CheckedIn { .. } => "checked_in",
            Self::WaitlistJoined { .. } => "waitlist_joined",
            Self::WaitlistPromoted { .. } => "waitlist_promoted",
            Self::WaitlistOfferExpired { .. } => "waitlist_offer_expired",
            Self::WaitlistConverted { .. } => "waitlist_converted",
            Self::UsageRecorded { .. } => "usage_recorded",
        }
    }
}

/// Why a notification could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The downstream channel is gone.
    #[error("notification channel closed")]
    Closed,

    /// The downstream channel refused the event.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Notification collaborator.
///
/// Implementations send confirmations, status changes and waitlist offers
/// over whatever channel the host provides.
pub trait Notifier: Send + Sync + 'static {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the event could not be handed off.
    fn notify(&self, event: DomainEvent) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

impl<N: Notifier> Notifier for Arc<N> {
    fn notify(&self, event: DomainEvent) -> impl Future<Output = Result<(), NotifyError>> + Send {
        (**self).notify(event)
    }
}

/// Deliver `event`, logging and swallowing any failure.
pub async fn deliver<N: Notifier>(notifier: &N, event: DomainEvent) {
    let name = event.name();
    match notifier.notify(event).await {
        Ok(()) => tracing::debug!(event = name, "Notification delivered"),
        Err(error) => tracing::warn!(event = name, %error, "Notification delivery failed"),
    }
}

/// Writes every event to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: DomainEvent) -> Result<(), NotifyError> {
        match &event {
            DomainEvent::BookingCreated { booking } => tracing::info!(
                booking_id = %booking.id,
                code = %booking.confirmation_code,
                email = %booking.customer.email,
                status = %booking.status,
                "Send booking confirmation"
            ),
            DomainEvent::StatusChanged { booking, from, to } => tracing::info!(
                booking_id = %booking.id,
                %from,
                %to,
                "Send status change"
            ),
            DomainEvent::CheckedIn { booking } => tracing::info!(
                booking_id = %booking.id,
                by = booking.checked_in_by.as_deref().unwrap_or("-"),
                "Guest checked in"
            ),
            DomainEvent::WaitlistJoined { entry } => tracing::info!(
                entry_id = %entry.id,
                scope = %entry.scope(),
                position = entry.position,
                "Send waitlist confirmation"
            ),
            DomainEvent::WaitlistPromoted { entry } => tracing::info!(
                entry_id = %entry.id,
                email = %entry.customer.email,
                expires_at = ?entry.expires_at,
                "Send waitlist offer"
            ),
            DomainEvent::WaitlistOfferExpired { entry } => {
                tracing::info!(entry_id = %entry.id, "Waitlist offer expired");
            },
            DomainEvent::WaitlistConverted { entry, booking_id } => tracing::info!(
                entry_id = %entry.id,
                %booking_id,
                "Waitlist offer claimed"
            ),
            DomainEvent::UsageRecorded { record } => tracing::info!(
                credential_id = %record.credential_id,
                booking_id = %record.booking_id,
                discount = %record.discount,
                "Credential used"
            ),
        }
        Ok(())
    }
}

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastNotifier {
    /// Creates a channel buffering up to `capacity` events per lagging subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event delivered from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: DomainEvent) -> Result<(), NotifyError> {
        // No receivers is not a failure.
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| NotifyError::Closed)
    }
}

/// Captures delivered events for assertions.
///
/// A notifier built with [`failing`](Self::failing) records nothing and
/// reports every delivery as failed.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<DomainEvent>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// A notifier that accepts every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that rejects every event.
    #[must_use]
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    /// Every event delivered so far.
    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of every event delivered so far.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::name).collect()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, event: DomainEvent) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording notifier set to fail".into()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
