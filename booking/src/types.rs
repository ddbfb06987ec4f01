//! Domain types for the booking engine.
//!
//! Identifiers, value objects, lifecycle enumerations and the persisted
//! records: bookings, events, categories, floor-plan elements, waitlist
//! entries and coupon/pass usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a booking
    BookingId
);
id_type!(
    /// Unique identifier for a timed event
    EventId
);
id_type!(
    /// Unique identifier for a ticket category
    CategoryId
);
id_type!(
    /// Unique identifier for a floor plan
    FloorPlanId
);
id_type!(
    /// Unique identifier for a bookable floor-plan element (seat, table, booth)
    ElementId
);
id_type!(
    /// Unique identifier for a waitlist entry
    WaitlistEntryId
);
id_type!(
    /// Unique identifier for a coupon or multi-use pass
    CredentialId
);
id_type!(
    /// Unique identifier for a coupon redemption / pass usage record
    UsageId
);
id_type!(
    /// Unique identifier for a registered user
    UserId
);

/// A string failed to parse into one of the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    /// Which enumeration was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stable lowercase name, as stored and sent over the wire
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money in minor units (cents) to avoid floating point errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Short public identifier a customer presents to reference a booking.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationCode(String);

impl ConfirmationCode {
    /// Wraps a code, upper-casing it so lookups are case-insensitive.
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-purpose secret that authorizes self-service cancellation.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CancelToken(String);

impl CancelToken {
    /// Wraps a raw token string
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelToken(<redacted>)")
    }
}

/// Contact details of whoever made the booking or joined the waitlist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Full name
    pub name: String,
    /// Email address
    pub email: String,
    /// Optional phone number
    pub phone: Option<String>,
}

/// Identity a coupon/pass per-user ceiling is counted against.
///
/// Registered users are counted by id, guests by lower-cased email.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    /// Identity of a registered user
    #[must_use]
    pub fn user(id: UserId) -> Self {
        Self(format!("user:{id}"))
    }

    /// Identity of a guest, keyed by email
    #[must_use]
    pub fn email(email: &str) -> Self {
        Self(format!("email:{}", email.trim().to_ascii_lowercase()))
    }

    /// Rebuild an identity from its stored form
    #[must_use]
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// Stored form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// What kind of claim a booking is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    /// A table/guestlist reservation counted against event capacity in guests
    Reservation,
    /// A ticket counted against its category
    Ticket,
}

string_enum!(BookingKind, "booking type" {
    Reservation => "reservation",
    Ticket => "ticket",
});

/// Payment state tracked on a booking. The engine never moves money.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing to pay
    #[default]
    None,
    /// Awaiting payment
    Pending,
    /// Paid in full
    Paid,
    /// Paid and refunded
    Refunded,
    /// Payment attempt failed
    Failed,
}

string_enum!(PaymentStatus, "payment status" {
    None => "none",
    Pending => "pending",
    Paid => "paid",
    Refunded => "refunded",
    Failed => "failed",
});

/// Lifecycle status of a booking.
///
/// ```text
/// Pending ──► Confirmed ──► CheckedIn
///    │            │
///    ├────────────┴──► Cancelled
///    └────────────┴──► NoShow
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Awaiting confirmation
    Pending,
    /// Confirmed and holding capacity
    Confirmed,
    /// Cancelled; capacity released
    Cancelled,
    /// Guest arrived
    CheckedIn,
    /// Guest never arrived
    NoShow,
}

string_enum!(BookingStatus, "booking status" {
    Pending => "pending",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    CheckedIn => "checked_in",
    NoShow => "no_show",
});

impl BookingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Cancelled,
        Self::CheckedIn,
        Self::NoShow,
    ];

    /// The transition table. Identity moves are not transitions.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Confirmed, Self::CheckedIn)
                | (Self::Pending | Self::Confirmed, Self::Cancelled | Self::NoShow)
        )
    }

    /// Cancelled and checked-in bookings accept no further writes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::CheckedIn)
    }

    /// Whether a booking in this status holds its element and category units.
    ///
    /// Only cancellation gives inventory back; a no-show keeps what it bought.
    #[must_use]
    pub const fn holds_inventory(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Whether a booking in this status seats guests against event capacity.
    #[must_use]
    pub const fn holds_capacity(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::CheckedIn)
    }

    /// Whether moving from `self` to `to` gives any capacity or inventory back.
    #[must_use]
    pub const fn releases_on(self, to: Self) -> bool {
        (self.holds_capacity() && !to.holds_capacity())
            || (self.holds_inventory() && !to.holds_inventory())
    }
}

/// Lifecycle status of a waitlist entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    /// Queued
    Waiting,
    /// Holding a time-boxed offer
    Notified,
    /// Offer lapsed unclaimed
    Expired,
    /// Offer claimed by a booking
    Converted,
}

string_enum!(WaitlistStatus, "waitlist status" {
    Waiting => "waiting",
    Notified => "notified",
    Expired => "expired",
    Converted => "converted",
});

impl WaitlistStatus {
    /// The transition table for waitlist entries.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Notified)
                | (Self::Notified, Self::Expired | Self::Converted)
        )
    }
}

/// Physical shape of a floor-plan element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Single seat
    Seat,
    /// Table with several seats
    Table,
    /// Booth or lounge area
    Booth,
}

string_enum!(ElementKind, "element kind" {
    Seat => "seat",
    Table => "table",
    Booth => "booth",
});

/// Whether a usage credential is a discount coupon or a multi-use pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Discount coupon
    Coupon,
    /// Multi-use pass
    Pass,
}

string_enum!(CredentialKind, "credential kind" {
    Coupon => "coupon",
    Pass => "pass",
});

// ============================================================================
// Records
// ============================================================================

/// A timed event that bookings are made against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// When the event starts
    pub starts_at: Option<DateTime<Utc>>,
    /// Aggregate guest capacity for reservations; `None` means unlimited
    pub capacity: Option<u32>,
    /// New bookings start `confirmed` instead of `pending`
    pub auto_confirm: bool,
    /// Rejected submissions may join the waitlist
    pub waitlist_enabled: bool,
}

impl Event {
    /// Creates an event with unlimited capacity, manual confirmation and no waitlist.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            starts_at: None,
            capacity: None,
            auto_confirm: false,
            waitlist_enabled: false,
        }
    }

    /// Capacity limit, treating zero as unlimited.
    #[must_use]
    pub fn capacity_limit(&self) -> Option<u32> {
        self.capacity.filter(|c| *c > 0)
    }
}

/// A named, priced ticket tier bound to one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique category identifier
    pub id: CategoryId,
    /// Owning event
    pub event_id: EventId,
    /// Display name (e.g. "VIP")
    pub name: String,
    /// Unit price
    pub price: Money,
    /// ISO currency code
    pub currency: String,
    /// Number of units on sale; `None` or zero means unlimited
    pub capacity: Option<u32>,
    /// Units consumed by capacity-holding bookings
    pub sold: u32,
    /// Sales open at
    pub sale_starts_at: Option<DateTime<Utc>>,
    /// Sales close at
    pub sale_ends_at: Option<DateTime<Utc>>,
    /// Optional floor-plan zone this tier maps to
    pub zone: Option<String>,
}

impl Category {
    /// Creates an unlimited, always-on-sale category.
    #[must_use]
    pub fn new(event_id: EventId, name: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(),
            event_id,
            name: name.into(),
            price: Money::default(),
            currency: "EUR".to_string(),
            capacity: None,
            sold: 0,
            sale_starts_at: None,
            sale_ends_at: None,
            zone: None,
        }
    }

    /// Capacity limit, treating zero as unlimited.
    #[must_use]
    pub fn capacity_limit(&self) -> Option<u32> {
        self.capacity.filter(|c| *c > 0)
    }

    /// Whether `now` falls inside the sale window.
    #[must_use]
    pub fn on_sale(&self, now: DateTime<Utc>) -> bool {
        self.sale_starts_at.is_none_or(|start| now >= start)
            && self.sale_ends_at.is_none_or(|end| now < end)
    }
}

/// A physically bookable unit on a floor plan.
///
/// A booking that references an element holds the whole element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorPlanElement {
    /// Unique element identifier
    pub id: ElementId,
    /// Floor plan the element is drawn on
    pub floor_plan_id: FloorPlanId,
    /// Event the floor plan is used for
    pub event_id: EventId,
    /// Human label (e.g. "Table 12")
    pub label: String,
    /// Seat, table or booth
    pub kind: ElementKind,
    /// Number of guests the element seats
    pub seats: u32,
}

/// One reservation or ticket claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier
    pub id: BookingId,
    /// Event booked
    pub event_id: EventId,
    /// Registered user, if any
    pub user_id: Option<UserId>,
    /// Reservation or ticket
    pub kind: BookingKind,
    /// Free-text category tag (table, vip, guestlist, ...)
    pub subtype: Option<String>,
    /// Floor-plan element held exclusively
    pub element_id: Option<ElementId>,
    /// Label of the element at booking time
    pub element_label: Option<String>,
    /// Ticket category consumed
    pub category_id: Option<CategoryId>,
    /// Total price
    pub price: Money,
    /// ISO currency code
    pub currency: String,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Lifecycle state
    pub status: BookingStatus,
    /// Units requested
    pub quantity: u32,
    /// Number of guests, at least one
    pub guests: u32,
    /// Who booked
    pub customer: Customer,
    /// Notes visible to the customer
    pub customer_notes: Option<String>,
    /// Staff-only notes
    pub internal_notes: Option<String>,
    /// Opaque extension data
    pub payload: serde_json::Value,
    /// Unique, immutable public code
    pub confirmation_code: ConfirmationCode,
    /// Secret authorizing self-service cancellation
    pub cancel_token: CancelToken,
    /// When the cancel token stops working
    pub cancel_token_expires_at: DateTime<Utc>,
    /// Set exactly when status is `checked_in`
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Who checked the guest in
    pub checked_in_by: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// How many units this booking takes from category and event capacity.
    ///
    /// Reservations are sized by their guests, tickets by their quantity.
    #[must_use]
    pub const fn capacity_demand(&self) -> u32 {
        demand_for(self.kind, self.quantity, self.guests)
    }

    /// Appends a line to the staff-only notes.
    pub fn append_internal_note(&mut self, line: &str) {
        match &mut self.internal_notes {
            Some(notes) if !notes.is_empty() => {
                notes.push('\n');
                notes.push_str(line);
            },
            _ => self.internal_notes = Some(line.to_string()),
        }
    }

    /// Waitlist scopes freed when this booking releases its capacity, most specific first.
    #[must_use]
    pub fn released_scopes(&self) -> Vec<WaitlistScope> {
        let mut scopes = Vec::with_capacity(3);
        if let Some(element_id) = self.element_id {
            scopes.push(WaitlistScope::Element {
                event_id: self.event_id,
                element_id,
            });
        }
        if let Some(category_id) = self.category_id {
            scopes.push(WaitlistScope::Category {
                event_id: self.event_id,
                category_id,
            });
        }
        scopes.push(WaitlistScope::Event {
            event_id: self.event_id,
        });
        scopes
    }
}

/// Capacity demand of a request: guests for reservations, quantity for tickets.
#[must_use]
pub const fn demand_for(kind: BookingKind, quantity: u32, guests: u32) -> u32 {
    match kind {
        BookingKind::Reservation => guests,
        BookingKind::Ticket => quantity,
    }
}

/// The queue a waitlist entry is ordered in.
///
/// When an entry names both an element and a category, the element wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum WaitlistScope {
    /// Whole-event queue
    Event {
        /// Event
        event_id: EventId,
    },
    /// Queue for one ticket category
    Category {
        /// Event
        event_id: EventId,
        /// Category
        category_id: CategoryId,
    },
    /// Queue for one floor-plan element
    Element {
        /// Event
        event_id: EventId,
        /// Element
        element_id: ElementId,
    },
}

impl WaitlistScope {
    /// Resolves a scope from optional references, element first.
    #[must_use]
    pub const fn resolve(
        event_id: EventId,
        category_id: Option<CategoryId>,
        element_id: Option<ElementId>,
    ) -> Self {
        match (element_id, category_id) {
            (Some(element_id), _) => Self::Element {
                event_id,
                element_id,
            },
            (None, Some(category_id)) => Self::Category {
                event_id,
                category_id,
            },
            (None, None) => Self::Event { event_id },
        }
    }

    /// Event the scope belongs to
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        match self {
            Self::Event { event_id }
            | Self::Category { event_id, .. }
            | Self::Element { event_id, .. } => *event_id,
        }
    }

    /// Stable string key, used for per-scope locking.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Event { event_id } => format!("waitlist:{event_id}"),
            Self::Category {
                event_id,
                category_id,
            } => format!("waitlist:{event_id}:category:{category_id}"),
            Self::Element {
                event_id,
                element_id,
            } => format!("waitlist:{event_id}:element:{element_id}"),
        }
    }
}

impl fmt::Display for WaitlistScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One queued request for capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Unique entry identifier
    pub id: WaitlistEntryId,
    /// Event waited for
    pub event_id: EventId,
    /// Optional category waited for
    pub category_id: Option<CategoryId>,
    /// Optional element waited for
    pub element_id: Option<ElementId>,
    /// Registered user, if any
    pub user_id: Option<UserId>,
    /// Who is waiting
    pub customer: Customer,
    /// Units requested
    pub quantity: u32,
    /// Lifecycle state
    pub status: WaitlistStatus,
    /// Queue position, unique and increasing within the scope
    pub position: u32,
    /// When the offer was made
    pub notified_at: Option<DateTime<Utc>>,
    /// When the offer lapses
    pub expires_at: Option<DateTime<Utc>>,
    /// Booking the entry converted into
    pub converted_booking_id: Option<BookingId>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// The queue this entry is ordered in.
    #[must_use]
    pub const fn scope(&self) -> WaitlistScope {
        WaitlistScope::resolve(self.event_id, self.category_id, self.element_id)
    }

    /// Units an offer to this entry sets aside: one element, or the requested quantity.
    #[must_use]
    pub const fn demand(&self) -> u32 {
        match self.scope() {
            WaitlistScope::Element { .. } => 1,
            WaitlistScope::Category { .. } | WaitlistScope::Event { .. } => self.quantity,
        }
    }

    /// Holds an offer that has not lapsed at `now`.
    #[must_use]
    pub fn has_live_offer(&self, now: DateTime<Utc>) -> bool {
        self.status == WaitlistStatus::Notified && self.expires_at.is_some_and(|at| at > now)
    }

    /// Holds an offer that lapsed at or before `now`.
    #[must_use]
    pub fn offer_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == WaitlistStatus::Notified && self.expires_at.is_none_or(|at| at <= now)
    }
}

/// A discount coupon or multi-use pass with usage ceilings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCredential {
    /// Unique credential identifier
    pub id: CredentialId,
    /// Coupon or pass
    pub kind: CredentialKind,
    /// Code the customer enters
    pub code: String,
    /// Global ceiling; `None` means unlimited
    pub usage_limit: Option<u32>,
    /// Ceiling per user identity; `None` means unlimited
    pub per_user_limit: Option<u32>,
    /// Uses recorded so far
    pub used: u32,
    /// Inactive credentials cannot be redeemed
    pub active: bool,
}

/// Join record tying a credential use to exactly one booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique usage identifier
    pub id: UsageId,
    /// Credential consumed
    pub credential_id: CredentialId,
    /// Booking it was applied to
    pub booking_id: BookingId,
    /// Identity the per-user ceiling counts
    pub user: UserIdentity,
    /// Discount granted
    pub discount: Money,
    /// When the use was recorded
    pub recorded_at: DateTime<Utc>,
}
