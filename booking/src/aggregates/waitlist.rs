//! Waitlist aggregate: one ordered queue per scope.
//!
//! ```text
//! Waiting ──► Notified ──► Converted
//!                 │
//!                 └──────► Expired
//! ```
//!
//! The state holds every entry of one scope, loaded under the store's
//! per-scope lock, so positions and live offers are computed against the
//! complete queue. Promotion walks the queue in position order and stops at
//! the first entry that does not fit: at most `max_live_offers` live offers,
//! and live offers never set aside more units than the scope has free.
//! Lapsed offers are expired lazily on the next promotion or sweep.

use crate::config::WaitlistPolicy;
use crate::error::BookingError;
use crate::notify::{DomainEvent, Notifier, deliver};
use crate::types::{
    BookingId, CategoryId, Customer, ElementId, UserId, WaitlistEntry, WaitlistEntryId,
    WaitlistScope, WaitlistStatus,
};
use chrono::{DateTime, Utc};
use seatkeeper_core::{
    SmallVec, async_effect, effect::Effect, environment::Clock, reducer::Reducer, smallvec,
};
use std::marker::PhantomData;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Every entry of one waitlist scope.
#[derive(Clone, Debug)]
pub struct WaitlistState {
    /// Queue the entries belong to
    pub scope: WaitlistScope,
    /// Entries in any status
    pub entries: Vec<WaitlistEntry>,
    /// Entry added by the last join
    pub joined: Option<WaitlistEntryId>,
    /// Entries offered a slot by the last command
    pub promoted: Vec<WaitlistEntryId>,
    /// Entries whose offers lapsed during the last command
    pub expired: Vec<WaitlistEntryId>,
    /// Entry converted by the last command
    pub converted: Option<WaitlistEntryId>,
    /// Free units remain but the head of the queue could not be offered them
    pub held_back: bool,
    /// Error from the last rejected command
    pub last_error: Option<BookingError>,
}

impl WaitlistState {
    /// State for `scope` holding `entries`.
    #[must_use]
    pub const fn new(scope: WaitlistScope, entries: Vec<WaitlistEntry>) -> Self {
        Self {
            scope,
            entries,
            joined: None,
            promoted: Vec::new(),
            expired: Vec::new(),
            converted: None,
            held_back: false,
            last_error: None,
        }
    }

    /// Position the next joiner receives: one past the highest ever assigned.
    #[must_use]
    pub fn next_position(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.position)
            .max()
            .unwrap_or(0)
            .saturating_add(1)
    }

    /// Entries holding an offer that has not lapsed at `now`.
    #[must_use]
    pub fn live_offers(&self, now: DateTime<Utc>) -> usize {
        self.entries.iter().filter(|e| e.has_live_offer(now)).count()
    }

    /// Units set aside by offers that have not lapsed at `now`.
    #[must_use]
    pub fn offered_units(&self, now: DateTime<Utc>) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.has_live_offer(now))
            .fold(0_u32, |sum, e| sum.saturating_add(e.demand()))
    }

    /// The waiting entry with the smallest position.
    #[must_use]
    pub fn head(&self) -> Option<&WaitlistEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == WaitlistStatus::Waiting)
            .min_by_key(|e| e.position)
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn entry(&self, id: WaitlistEntryId) -> Option<&WaitlistEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn entry_mut(&mut self, id: WaitlistEntryId) -> Option<&mut WaitlistEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    fn reset_outcome(&mut self) {
        self.joined = None;
        self.promoted.clear();
        self.expired.clear();
        self.converted = None;
        self.held_back = false;
        self.last_error = None;
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Inputs to the waitlist reducer.
#[derive(Clone, Debug)]
pub enum WaitlistAction {
    // Commands
    /// Append a new entry at the back of the queue
    Join {
        /// Id for the new entry
        entry_id: WaitlistEntryId,
        /// Registered user, if any
        user_id: Option<UserId>,
        /// Who is waiting
        customer: Customer,
        /// Units requested
        quantity: u32,
        /// Category waited for
        category_id: Option<CategoryId>,
        /// Element waited for
        element_id: Option<ElementId>,
    },
    /// Expire lapsed offers, then offer free units to the head of the queue
    Promote {
        /// Units of the scope no booking holds; `None` when unlimited
        available: Option<u32>,
    },
    /// Mark an offer as claimed by `booking_id`
    Convert {
        /// Entry claiming its offer
        entry_id: WaitlistEntryId,
        /// Booking that claims it
        booking_id: BookingId,
    },

    // Events
    /// Entry appended
    Joined {
        /// The new entry
        entry: Box<WaitlistEntry>,
    },
    /// Entry offered a slot
    Promoted {
        /// Entry
        entry_id: WaitlistEntryId,
        /// When the offer was made
        at: DateTime<Utc>,
        /// When it lapses
        expires_at: DateTime<Utc>,
    },
    /// Offer lapsed
    OfferExpired {
        /// Entry
        entry_id: WaitlistEntryId,
        /// When the lapse was recorded
        at: DateTime<Utc>,
    },
    /// Offer claimed
    Converted {
        /// Entry
        entry_id: WaitlistEntryId,
        /// Claiming booking
        booking_id: BookingId,
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

/// Dependencies of the waitlist reducer.
pub struct WaitlistEnvironment<N> {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Notification collaborator
    pub notifier: Arc<N>,
    /// Offer window and concurrency
    pub policy: WaitlistPolicy,
}

impl<N> WaitlistEnvironment<N> {
    /// Creates a new `WaitlistEnvironment`
    #[must_use]
    pub const fn new(clock: Arc<dyn Clock>, notifier: Arc<N>, policy: WaitlistPolicy) -> Self {
        Self {
            clock,
            notifier,
            policy,
        }
    }
}

impl<N> Clone for WaitlistEnvironment<N> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            notifier: Arc::clone(&self.notifier),
            policy: self.policy.clone(),
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for one waitlist scope.
#[derive(Debug)]
pub struct WaitlistReducer<N> {
    _phantom: PhantomData<fn() -> N>,
}

impl<N> WaitlistReducer<N> {
    /// Creates a new `WaitlistReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<N> Default for WaitlistReducer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> Clone for WaitlistReducer<N> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<N: Notifier> WaitlistReducer<N> {
    fn apply_event(state: &mut WaitlistState, action: &WaitlistAction) {
        match action {
            WaitlistAction::Joined { entry } => {
                state.joined = Some(entry.id);
                state.entries.push((**entry).clone());
            },
            WaitlistAction::Promoted {
                entry_id,
                at,
                expires_at,
            } => {
                if let Some(entry) = state.entry_mut(*entry_id) {
                    entry.status = WaitlistStatus::Notified;
                    entry.notified_at = Some(*at);
                    entry.expires_at = Some(*expires_at);
                    entry.updated_at = *at;
                }
                state.promoted.push(*entry_id);
            },
            WaitlistAction::OfferExpired { entry_id, at } => {
                if let Some(entry) = state.entry_mut(*entry_id) {
                    entry.status = WaitlistStatus::Expired;
                    entry.updated_at = *at;
                }
                state.expired.push(*entry_id);
            },
            WaitlistAction::Converted {
                entry_id,
                booking_id,
                at,
            } => {
                if let Some(entry) = state.entry_mut(*entry_id) {
                    entry.status = WaitlistStatus::Converted;
                    entry.converted_booking_id = Some(*booking_id);
                    entry.updated_at = *at;
                }
                state.converted = Some(*entry_id);
            },
            WaitlistAction::Rejected { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands are not applied
            WaitlistAction::Join { .. }
            | WaitlistAction::Promote { .. }
            | WaitlistAction::Convert { .. } => {},
        }
    }

    fn reject(
        state: &mut WaitlistState,
        error: BookingError,
    ) -> SmallVec<[Effect<WaitlistAction>; 4]> {
        tracing::warn!(scope = %state.scope, %error, "Waitlist command rejected");
        Self::apply_event(state, &WaitlistAction::Rejected { error });
        SmallVec::new()
    }

    fn notify(env: &WaitlistEnvironment<N>, event: DomainEvent) -> Effect<WaitlistAction> {
        let notifier = Arc::clone(&env.notifier);
        async_effect! {
            deliver(&notifier, event).await;
            None
        }
    }

    fn entry_events<F>(
        state: &WaitlistState,
        ids: &[WaitlistEntryId],
        env: &WaitlistEnvironment<N>,
        event: F,
    ) -> Vec<Effect<WaitlistAction>>
    where
        F: Fn(WaitlistEntry) -> DomainEvent,
    {
        ids.iter()
            .filter_map(|id| state.entry(*id))
            .map(|entry| Self::notify(env, event(entry.clone())))
            .collect()
    }

    fn expire_lapsed(state: &mut WaitlistState, now: DateTime<Utc>) {
        let lapsed: Vec<WaitlistEntryId> = state
            .entries
            .iter()
            .filter(|e| e.offer_lapsed(now))
            .map(|e| e.id)
            .collect();
        for entry_id in &lapsed {
            Self::apply_event(
                state,
                &WaitlistAction::OfferExpired {
                    entry_id: *entry_id,
                    at: now,
                },
            );
        }
    }

    /// Offers free units to waiting entries in position order.
    ///
    /// The head is never skipped: when it does not fit, nobody behind it is offered.
    fn promote_heads(
        state: &mut WaitlistState,
        available: Option<u32>,
        env: &WaitlistEnvironment<N>,
    ) {
        let now = env.clock.now();
        let cap = env.policy.max_live_offers.max(1);
        let mut live = state.live_offers(now);
        let mut free = available.map(|units| units.saturating_sub(state.offered_units(now)));

        while let Some((head, demand)) = state.head().map(|e| (e.id, e.demand())) {
            if live >= cap || free.is_some_and(|left| demand > left) {
                state.held_back = free != Some(0);
                break;
            }
            Self::apply_event(
                state,
                &WaitlistAction::Promoted {
                    entry_id: head,
                    at: now,
                    expires_at: now + env.policy.offer_window(),
                },
            );
            live += 1;
            free = free.map(|left| left.saturating_sub(demand));
        }
    }

    fn promotion_effects(
        state: &WaitlistState,
        env: &WaitlistEnvironment<N>,
    ) -> SmallVec<[Effect<WaitlistAction>; 4]> {
        let mut effects = Self::entry_events(state, &state.expired, env, |entry| {
            DomainEvent::WaitlistOfferExpired { entry }
        });
        effects.extend(Self::entry_events(state, &state.promoted, env, |entry| {
            DomainEvent::WaitlistPromoted { entry }
        }));

        if effects.is_empty() {
            SmallVec::new()
        } else {
            smallvec![Effect::merge(effects)]
        }
    }
}

impl<N: Notifier> Reducer for WaitlistReducer<N> {
    type State = WaitlistState;
    type Action = WaitlistAction;
    type Environment = WaitlistEnvironment<N>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            WaitlistAction::Join {
                entry_id,
                user_id,
                customer,
                quantity,
                category_id,
                element_id,
            } => {
                state.reset_outcome();
                let scope = WaitlistScope::resolve(state.scope.event_id(), category_id, element_id);
                if scope != state.scope {
                    return Self::reject(
                        state,
                        BookingError::Conflict(format!(
                            "entry belongs to {scope}, not {}",
                            state.scope
                        )),
                    );
                }

                let now = env.clock.now();
                let entry = WaitlistEntry {
                    id: entry_id,
                    event_id: scope.event_id(),
                    category_id,
                    element_id,
                    user_id,
                    customer,
                    quantity,
                    status: WaitlistStatus::Waiting,
                    position: state.next_position(),
                    notified_at: None,
                    expires_at: None,
                    converted_booking_id: None,
                    created_at: now,
                    updated_at: now,
                };
                let event = DomainEvent::WaitlistJoined {
                    entry: entry.clone(),
                };
                Self::apply_event(
                    state,
                    &WaitlistAction::Joined {
                        entry: Box::new(entry),
                    },
                );
                smallvec![Self::notify(env, event)]
            },

            WaitlistAction::Promote { available } => {
                state.reset_outcome();
                Self::expire_lapsed(state, env.clock.now());
                Self::promote_heads(state, available, env);
                Self::promotion_effects(state, env)
            },

            WaitlistAction::Convert {
                entry_id,
                booking_id,
            } => {
                state.reset_outcome();
                let now = env.clock.now();
                let Some(entry) = state.entry(entry_id) else {
                    return Self::reject(state, BookingError::not_found("waitlist entry", entry_id));
                };
                if entry.status != WaitlistStatus::Notified {
                    let status = entry.status;
                    return Self::reject(
                        state,
                        BookingError::Conflict(format!(
                            "waitlist entry is {status}, only notified entries convert"
                        )),
                    );
                }
                if !entry.has_live_offer(now) {
                    return Self::reject(
                        state,
                        BookingError::Conflict("waitlist offer has expired".into()),
                    );
                }

                Self::apply_event(
                    state,
                    &WaitlistAction::Converted {
                        entry_id,
                        booking_id,
                        at: now,
                    },
                );
                match state.entry(entry_id) {
                    Some(entry) => smallvec![Self::notify(
                        env,
                        DomainEvent::WaitlistConverted {
                            entry: entry.clone(),
                            booking_id,
                        }
                    )],
                    None => SmallVec::new(),
                }
            },

            // ========== Events ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
