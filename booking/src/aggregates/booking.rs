//! Booking aggregate: the lifecycle of one reservation record.
//!
//! ```text
//! Pending ──► Confirmed ──► CheckedIn
//!    │            │
//!    ├────────────┴──► Cancelled
//!    └────────────┴──► NoShow
//! ```
//!
//! The reducer runs inside the store's update closure, so the record it sees
//! is the locked, current one. Rejected commands leave the record untouched,
//! set `last_error` and return no effects. Notifications are returned as
//! effects and only run once the store has committed.

use crate::error::{BookingError, TokenError};
use crate::notify::{DomainEvent, Notifier, deliver};
use crate::types::{Booking, BookingStatus};
use chrono::{DateTime, Utc};
use seatkeeper_core::{
    SmallVec, async_effect, effect::Effect, environment::Clock, reducer::Reducer, smallvec,
};
use std::marker::PhantomData;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// What the last accepted command did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    /// The booking was placed
    Created,
    /// Status moved
    Transitioned {
        /// Previous status
        from: BookingStatus,
        /// New status
        to: BookingStatus,
    },
    /// Check-in repeated on a checked-in booking
    AlreadyCheckedIn,
    /// Requested status equals the current one
    Unchanged,
}

/// State owned by the booking reducer.
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// The record, once placed or loaded
    pub booking: Option<Booking>,
    /// Outcome of the last accepted command
    pub outcome: Option<BookingOutcome>,
    /// Error from the last rejected command
    pub last_error: Option<BookingError>,
}

impl BookingState {
    /// State around an existing record.
    #[must_use]
    pub const fn loaded(booking: Booking) -> Self {
        Self {
            booking: Some(booking),
            outcome: None,
            last_error: None,
        }
    }

    /// Current status, if a record is loaded.
    #[must_use]
    pub fn status(&self) -> Option<BookingStatus> {
        self.booking.as_ref().map(|b| b.status)
    }

    /// The status change made by the last command, if any.
    #[must_use]
    pub const fn transition(&self) -> Option<(BookingStatus, BookingStatus)> {
        match self.outcome {
            Some(BookingOutcome::Transitioned { from, to }) => Some((from, to)),
            _ => None,
        }
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Inputs to the booking reducer.
#[derive(Clone, Debug)]
pub enum BookingAction {
    // Commands
    /// Take ownership of a freshly admitted record
    Place {
        /// The admitted booking
        booking: Box<Booking>,
    },
    /// Move to `to`, following the transition table
    SetStatus {
        /// Target status
        to: BookingStatus,
    },
    /// Check the guest in
    CheckIn {
        /// Who performed the check-in
        actor: Option<String>,
    },
    /// Cancel, noting `reason` internally
    Cancel {
        /// Why
        reason: Option<String>,
    },
    /// Self-service cancel, authorized by the cancel token
    CancelWithToken {
        /// Token presented by the customer
        token: String,
        /// Why
        reason: Option<String>,
    },

    // Events
    /// The record was placed
    Placed {
        /// The booking
        booking: Box<Booking>,
    },
    /// Status moved
    StatusChanged {
        /// Previous status
        from: BookingStatus,
        /// New status
        to: BookingStatus,
        /// When
        at: DateTime<Utc>,
    },
    /// Guest checked in
    CheckedIn {
        /// Who performed the check-in
        actor: Option<String>,
        /// When
        at: DateTime<Utc>,
    },
    /// Booking cancelled
    Cancelled {
        /// Status before cancellation
        from: BookingStatus,
        /// Why
        reason: Option<String>,
        /// When
        at: DateTime<Utc>,
    },
    /// A command was refused
    Rejected {
        /// Why
        error: BookingError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking reducer.
pub struct BookingEnvironment<N> {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Notification collaborator
    pub notifier: Arc<N>,
}

impl<N> BookingEnvironment<N> {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub const fn new(clock: Arc<dyn Clock>, notifier: Arc<N>) -> Self {
        Self { clock, notifier }
    }
}

impl<N> Clone for BookingEnvironment<N> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the booking lifecycle.
#[derive(Debug)]
pub struct BookingReducer<N> {
    _phantom: PhantomData<fn() -> N>,
}

impl<N> BookingReducer<N> {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<N> Default for BookingReducer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Clone for BookingReducer<N> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<N: Notifier> BookingReducer<N> {
    fn apply_event(state: &mut BookingState, action: &BookingAction) {
        match action {
            BookingAction::Placed { booking } => {
                state.booking = Some((**booking).clone());
                state.outcome = Some(BookingOutcome::Created);
                state.last_error = None;
            },
            BookingAction::StatusChanged { from, to, at } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.status = *to;
                    booking.updated_at = *at;
                }
                state.outcome = Some(BookingOutcome::Transitioned {
                    from: *from,
                    to: *to,
                });
                state.last_error = None;
            },
            BookingAction::CheckedIn { actor, at } => {
                let mut from = BookingStatus::Confirmed;
                if let Some(booking) = state.booking.as_mut() {
                    from = booking.status;
                    booking.status = BookingStatus::CheckedIn;
                    booking.checked_in_at = Some(*at);
                    booking.checked_in_by.clone_from(actor);
                    booking.updated_at = *at;
                }
                state.outcome = Some(BookingOutcome::Transitioned {
                    from,
                    to: BookingStatus::CheckedIn,
                });
                state.last_error = None;
            },
            BookingAction::Cancelled { from, reason, at } => {
                if let Some(booking) = state.booking.as_mut() {
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = *at;
                    if let Some(reason) = reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                        booking.append_internal_note(&format!("[cancelled] {reason}"));
                    }
                }
                state.outcome = Some(BookingOutcome::Transitioned {
                    from: *from,
                    to: BookingStatus::Cancelled,
                });
                state.last_error = None;
            },
            BookingAction::Rejected { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands are not applied
            BookingAction::Place { .. }
            | BookingAction::SetStatus { .. }
            | BookingAction::CheckIn { .. }
            | BookingAction::Cancel { .. }
            | BookingAction::CancelWithToken { .. } => {},
        }
    }

    fn validate_transition(current: BookingStatus, to: BookingStatus) -> Result<(), BookingError> {
        if current == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }
        if current.can_transition_to(to) {
            Ok(())
        } else {
            Err(BookingError::InvalidTransition { from: current, to })
        }
    }

    fn validate_token(booking: &Booking, token: &str, now: DateTime<Utc>) -> Result<(), BookingError> {
        if !constant_time_eq::constant_time_eq(
            token.as_bytes(),
            booking.cancel_token.expose().as_bytes(),
        ) {
            return Err(TokenError::Mismatch.into());
        }
        if now >= booking.cancel_token_expires_at {
            return Err(TokenError::Expired.into());
        }
        Ok(())
    }

    fn reject(state: &mut BookingState, error: BookingError) -> SmallVec<[Effect<BookingAction>; 4]> {
        tracing::warn!(
            booking_id = ?state.booking.as_ref().map(|b| b.id),
            %error,
            "Booking command rejected"
        );
        Self::apply_event(state, &BookingAction::Rejected { error });
        SmallVec::new()
    }

    fn notify(env: &BookingEnvironment<N>, event: DomainEvent) -> Effect<BookingAction> {
        let notifier = Arc::clone(&env.notifier);
        async_effect! {
            deliver(&notifier, event).await;
            None
        }
    }

    fn cancel(
        state: &mut BookingState,
        reason: Option<String>,
        env: &BookingEnvironment<N>,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        let Some(current) = state.status() else {
            return Self::reject(state, BookingError::Conflict("no booking loaded".into()));
        };
        if let Err(error) = Self::validate_transition(current, BookingStatus::Cancelled) {
            return Self::reject(state, error);
        }

        Self::apply_event(
            state,
            &BookingAction::Cancelled {
                from: current,
                reason,
                at: env.clock.now(),
            },
        );
        Self::status_effects(state, current, BookingStatus::Cancelled, env)
    }

    fn check_in(
        state: &mut BookingState,
        actor: Option<String>,
        env: &BookingEnvironment<N>,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        let Some(current) = state.status() else {
            return Self::reject(state, BookingError::Conflict("no booking loaded".into()));
        };
        if current == BookingStatus::CheckedIn {
            state.outcome = Some(BookingOutcome::AlreadyCheckedIn);
            state.last_error = None;
            return SmallVec::new();
        }
        if let Err(error) = Self::validate_transition(current, BookingStatus::CheckedIn) {
            return Self::reject(state, error);
        }

        Self::apply_event(
            state,
            &BookingAction::CheckedIn {
                actor,
                at: env.clock.now(),
            },
        );
        match &state.booking {
            Some(booking) => smallvec![Self::notify(
                env,
                DomainEvent::CheckedIn {
                    booking: booking.clone(),
                }
            )],
            None => SmallVec::new(),
        }
    }

    fn status_effects(
        state: &BookingState,
        from: BookingStatus,
        to: BookingStatus,
        env: &BookingEnvironment<N>,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        match &state.booking {
            Some(booking) => smallvec![Self::notify(
                env,
                DomainEvent::StatusChanged {
                    booking: booking.clone(),
                    from,
                    to,
                }
            )],
            None => SmallVec::new(),
        }
    }
}

impl<N: Notifier> Reducer for BookingReducer<N> {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment<N>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            BookingAction::Place { booking } => {
                if state.booking.is_some() {
                    return Self::reject(
                        state,
                        BookingError::Conflict(format!("booking {} already placed", booking.id)),
                    );
                }
                let event = DomainEvent::BookingCreated {
                    booking: (*booking).clone(),
                };
                Self::apply_event(state, &BookingAction::Placed { booking });
                smallvec![Self::notify(env, event)]
            },

            BookingAction::SetStatus { to } => {
                let Some(current) = state.status() else {
                    return Self::reject(state, BookingError::Conflict("no booking loaded".into()));
                };
                match to {
                    BookingStatus::Cancelled => Self::cancel(state, None, env),
                    BookingStatus::CheckedIn if current != BookingStatus::CheckedIn => {
                        Self::check_in(state, None, env)
                    },
                    _ if current == to && current != BookingStatus::CheckedIn => {
                        state.outcome = Some(BookingOutcome::Unchanged);
                        state.last_error = None;
                        SmallVec::new()
                    },
                    _ => {
                        if let Err(error) = Self::validate_transition(current, to) {
                            return Self::reject(state, error);
                        }
                        Self::apply_event(
                            state,
                            &BookingAction::StatusChanged {
                                from: current,
                                to,
                                at: env.clock.now(),
                            },
                        );
                        Self::status_effects(state, current, to, env)
                    },
                }
            },

            BookingAction::CheckIn { actor } => Self::check_in(state, actor, env),

            BookingAction::Cancel { reason } => Self::cancel(state, reason, env),

            BookingAction::CancelWithToken { token, reason } => {
                let Some(booking) = state.booking.as_ref() else {
                    return Self::reject(state, BookingError::Conflict("no booking loaded".into()));
                };
                if let Err(error) = Self::validate_token(booking, &token, env.clock.now()) {
                    return Self::reject(state, error);
                }
                Self::cancel(state, reason, env)
            },

            // ========== Events ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
