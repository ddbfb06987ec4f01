//! PostgreSQL store.
//!
//! # Concurrency
//!
//! - Admission locks the event row (`SELECT ... FOR UPDATE`), so admissions
//!   for one event are serialized; the ledger figures it reads are current.
//!   Category `sold` moves through a conditional `UPDATE` that refuses to
//!   pass capacity, and the partial unique index `bookings_element_exclusive`
//!   backs element exclusivity.
//! - Lifecycle updates lock the booking row for the duration of the closure.
//! - Waitlist updates take `pg_advisory_xact_lock(hashtext(scope_key))`.
//! - Usage redemption locks the credential row and increments conditionally.
//!
//! # Example
//!
//! ```no_run
//! use seatkeeper::store::PostgresStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgres://localhost/seatkeeper").await?;
//! let store = PostgresStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use super::{Admission, BookingStore};
use crate::availability::{AdmissionRequest, Availability, AvailabilityChecker};
use crate::error::{BookingError, Result};
use crate::ledger::{self, LedgerSnapshot};
use crate::query::{BookingQuery, Page};
use crate::types::{
    Booking, BookingId, CancelToken, Category, CategoryId, ConfirmationCode, CredentialId,
    Customer, ElementId, Event, EventId, FloorPlanElement, FloorPlanId, Money, UsageCredential,
    UsageRecord, UserId, WaitlistEntry, WaitlistEntryId, WaitlistScope,
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Row mapping
// ============================================================================

const EVENT_COLUMNS: &str = "id, name, starts_at, capacity, auto_confirm, waitlist_enabled";

const CATEGORY_COLUMNS: &str = "id, event_id, name, price_cents, currency, capacity, sold, \
     sale_starts_at, sale_ends_at, zone";

const ELEMENT_COLUMNS: &str = "id, floor_plan_id, event_id, label, kind, seats";

const BOOKING_COLUMNS: &str = "id, event_id, user_id, kind, subtype, element_id, element_label, \
     category_id, price_cents, currency, payment_status, status, quantity, guests, \
     customer_name, customer_email, customer_phone, customer_notes, internal_notes, payload, \
     confirmation_code, cancel_token, cancel_token_expires_at, checked_in_at, checked_in_by, \
     created_at, updated_at";

const WAITLIST_COLUMNS: &str = "id, event_id, category_id, element_id, user_id, customer_name, \
     customer_email, customer_phone, quantity, status, position, notified_at, expires_at, \
     converted_booking_id, created_at, updated_at";

const CREDENTIAL_COLUMNS: &str = "id, kind, code, usage_limit, per_user_limit, used, active";

fn count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn cents(value: i64) -> Money {
    Money::from_cents(u64::try_from(value.max(0)).unwrap_or(0))
}

fn money_column(money: Money) -> i64 {
    i64::try_from(money.cents()).unwrap_or(i64::MAX)
}

fn parse_column<T>(column: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| BookingError::Storage(format!("Corrupt {column} column: {e}")))
}

fn db(context: &'static str) -> impl FnOnce(sqlx::Error) -> BookingError {
    move |error| {
        tracing::error!(%error, context, "Database operation failed");
        BookingError::Storage(format!("Failed to {context}: {error}"))
    }
}

fn constraint_of(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    starts_at: Option<DateTime<Utc>>,
    capacity: Option<i64>,
    auto_confirm: bool,
    waitlist_enabled: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::from_uuid(row.id),
            name: row.name,
            starts_at: row.starts_at,
            capacity: row.capacity.map(count),
            auto_confirm: row.auto_confirm,
            waitlist_enabled: row.waitlist_enabled,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    price_cents: i64,
    currency: String,
    capacity: Option<i64>,
    sold: i64,
    sale_starts_at: Option<DateTime<Utc>>,
    sale_ends_at: Option<DateTime<Utc>>,
    zone: Option<String>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            name: row.name,
            price: cents(row.price_cents),
            currency: row.currency,
            capacity: row.capacity.map(count),
            sold: count(row.sold),
            sale_starts_at: row.sale_starts_at,
            sale_ends_at: row.sale_ends_at,
            zone: row.zone,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ElementRow {
    id: Uuid,
    floor_plan_id: Uuid,
    event_id: Uuid,
    label: String,
    kind: String,
    seats: i64,
}

impl TryFrom<ElementRow> for FloorPlanElement {
    type Error = BookingError;

    fn try_from(row: ElementRow) -> Result<Self> {
        Ok(Self {
            id: ElementId::from_uuid(row.id),
            floor_plan_id: FloorPlanId::from_uuid(row.floor_plan_id),
            event_id: EventId::from_uuid(row.event_id),
            label: row.label,
            kind: parse_column("kind", &row.kind)?,
            seats: count(row.seats),
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    event_id: Uuid,
    user_id: Option<Uuid>,
    kind: String,
    subtype: Option<String>,
    element_id: Option<Uuid>,
    element_label: Option<String>,
    category_id: Option<Uuid>,
    price_cents: i64,
    currency: String,
    payment_status: String,
    status: String,
    quantity: i64,
    guests: i64,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    customer_notes: Option<String>,
    internal_notes: Option<String>,
    payload: serde_json::Value,
    confirmation_code: String,
    cancel_token: String,
    cancel_token_expires_at: DateTime<Utc>,
    checked_in_at: Option<DateTime<Utc>>,
    checked_in_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = BookingError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Self {
            id: BookingId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            user_id: row.user_id.map(UserId::from_uuid),
            kind: parse_column("kind", &row.kind)?,
            subtype: row.subtype,
            element_id: row.element_id.map(ElementId::from_uuid),
            element_label: row.element_label,
            category_id: row.category_id.map(CategoryId::from_uuid),
            price: cents(row.price_cents),
            currency: row.currency,
            payment_status: parse_column("payment_status", &row.payment_status)?,
            status: parse_column("status", &row.status)?,
            quantity: count(row.quantity),
            guests: count(row.guests),
            customer: Customer {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
            },
            customer_notes: row.customer_notes,
            internal_notes: row.internal_notes,
            payload: row.payload,
            confirmation_code: ConfirmationCode::new(row.confirmation_code),
            cancel_token: CancelToken::new(row.cancel_token),
            cancel_token_expires_at: row.cancel_token_expires_at,
            checked_in_at: row.checked_in_at,
            checked_in_by: row.checked_in_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WaitlistRow {
    id: Uuid,
    event_id: Uuid,
    category_id: Option<Uuid>,
    element_id: Option<Uuid>,
    user_id: Option<Uuid>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    quantity: i64,
    status: String,
    position: i64,
    notified_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    converted_booking_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WaitlistRow> for WaitlistEntry {
    type Error = BookingError;

    fn try_from(row: WaitlistRow) -> Result<Self> {
        Ok(Self {
            id: WaitlistEntryId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            category_id: row.category_id.map(CategoryId::from_uuid),
            element_id: row.element_id.map(ElementId::from_uuid),
            user_id: row.user_id.map(UserId::from_uuid),
            customer: Customer {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
            },
            quantity: count(row.quantity),
            status: parse_column("status", &row.status)?,
            position: count(row.position),
            notified_at: row.notified_at,
            expires_at: row.expires_at,
            converted_booking_id: row.converted_booking_id.map(BookingId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    kind: String,
    code: String,
    usage_limit: Option<i64>,
    per_user_limit: Option<i64>,
    used: i64,
    active: bool,
}

impl TryFrom<CredentialRow> for UsageCredential {
    type Error = BookingError;

    fn try_from(row: CredentialRow) -> Result<Self> {
        Ok(Self {
            id: CredentialId::from_uuid(row.id),
            kind: parse_column("kind", &row.kind)?,
            code: row.code,
            usage_limit: row.usage_limit.map(count),
            per_user_limit: row.per_user_limit.map(count),
            used: count(row.used),
            active: row.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScopeRow {
    event_id: Uuid,
    category_id: Option<Uuid>,
    element_id: Option<Uuid>,
}

// ============================================================================
// Store
// ============================================================================

/// PostgreSQL [`BookingStore`].
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BookingError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    async fn load_event(conn: &mut PgConnection, id: EventId, for_update: bool) -> Result<Event> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1{lock}");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db("load event"))?
            .map(Event::from)
            .ok_or_else(|| BookingError::not_found("event", id))
    }

    async fn snapshot(
        conn: &mut PgConnection,
        request: &AdmissionRequest,
        for_update: bool,
    ) -> Result<LedgerSnapshot> {
        let event = Self::load_event(conn, request.event_id, for_update).await?;

        let category = match request.category_id {
            Some(id) => Some(
                sqlx::query_as::<_, CategoryRow>(&format!(
                    "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db("load category"))?
                .map(Category::from)
                .ok_or_else(|| BookingError::not_found("category", id))?,
            ),
            None => None,
        };

        let (element, element_holder) = match request.element_id {
            Some(id) => {
                let element: FloorPlanElement = sqlx::query_as::<_, ElementRow>(&format!(
                    "SELECT {ELEMENT_COLUMNS} FROM floor_plan_elements WHERE id = $1"
                ))
                .bind(id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db("load element"))?
                .ok_or_else(|| BookingError::not_found("element", id))?
                .try_into()?;

                let holder = sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM bookings \
                     WHERE event_id = $1 AND element_id = $2 AND status <> 'cancelled' \
                     LIMIT 1",
                )
                .bind(request.event_id.as_uuid())
                .bind(id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db("check element holder"))?
                .map(BookingId::from_uuid);

                (Some(element), holder)
            },
            None => (None, None),
        };

        let reserved_guests = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(guests), 0)::BIGINT FROM bookings \
             WHERE event_id = $1 AND kind = 'reservation' \
               AND status IN ('pending', 'confirmed', 'checked_in')",
        )
        .bind(request.event_id.as_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(db("sum reserved guests"))?;

        Ok(LedgerSnapshot {
            event,
            category,
            element,
            element_holder,
            reserved_guests: count(reserved_guests),
        })
    }

    async fn code_taken(conn: &mut PgConnection, code: &ConfirmationCode) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE confirmation_code = $1) \
                 OR EXISTS (SELECT 1 FROM retired_confirmation_codes WHERE code = $1)",
        )
        .bind(code.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(db("check confirmation code"))
    }

    async fn insert_booking(conn: &mut PgConnection, booking: &Booking) -> sqlx::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
              $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)"
        ))
        .bind(booking.id.as_uuid())
        .bind(booking.event_id.as_uuid())
        .bind(booking.user_id.map(|id| *id.as_uuid()))
        .bind(booking.kind.as_str())
        .bind(booking.subtype.as_deref())
        .bind(booking.element_id.map(|id| *id.as_uuid()))
        .bind(booking.element_label.as_deref())
        .bind(booking.category_id.map(|id| *id.as_uuid()))
        .bind(money_column(booking.price))
        .bind(&booking.currency)
        .bind(booking.payment_status.as_str())
        .bind(booking.status.as_str())
        .bind(i64::from(booking.quantity))
        .bind(i64::from(booking.guests))
        .bind(&booking.customer.name)
        .bind(&booking.customer.email)
        .bind(booking.customer.phone.as_deref())
        .bind(booking.customer_notes.as_deref())
        .bind(booking.internal_notes.as_deref())
        .bind(&booking.payload)
        .bind(booking.confirmation_code.as_str())
        .bind(booking.cancel_token.expose())
        .bind(booking.cancel_token_expires_at)
        .bind(booking.checked_in_at)
        .bind(booking.checked_in_by.as_deref())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn release_category(conn: &mut PgConnection, booking: &Booking) -> Result<()> {
        if let Some(category_id) = booking.category_id {
            sqlx::query("UPDATE categories SET sold = GREATEST(sold - $2, 0) WHERE id = $1")
                .bind(category_id.as_uuid())
                .bind(i64::from(booking.capacity_demand()))
                .execute(&mut *conn)
                .await
                .map_err(db("release category capacity"))?;
        }
        Ok(())
    }

    async fn lock_booking(conn: &mut PgConnection, id: BookingId) -> Result<Booking> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db("lock booking"))?
        .ok_or_else(|| BookingError::not_found("booking", id))?
        .try_into()
    }

    async fn upsert_waitlist_entry(conn: &mut PgConnection, entry: &WaitlistEntry) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO waitlist_entries ({WAITLIST_COLUMNS}, scope_key) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             ON CONFLICT (id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 notified_at = EXCLUDED.notified_at, \
                 expires_at = EXCLUDED.expires_at, \
                 converted_booking_id = EXCLUDED.converted_booking_id, \
                 updated_at = EXCLUDED.updated_at"
        ))
        .bind(entry.id.as_uuid())
        .bind(entry.event_id.as_uuid())
        .bind(entry.category_id.map(|id| *id.as_uuid()))
        .bind(entry.element_id.map(|id| *id.as_uuid()))
        .bind(entry.user_id.map(|id| *id.as_uuid()))
        .bind(&entry.customer.name)
        .bind(&entry.customer.email)
        .bind(entry.customer.phone.as_deref())
        .bind(i64::from(entry.quantity))
        .bind(entry.status.as_str())
        .bind(i64::from(entry.position))
        .bind(entry.notified_at)
        .bind(entry.expires_at)
        .bind(entry.converted_booking_id.map(|id| *id.as_uuid()))
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(entry.scope().key())
        .execute(&mut *conn)
        .await
        .map_err(db("write waitlist entry"))?;
        Ok(())
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, event_id: EventId, query: &BookingQuery) {
        builder.push(" WHERE event_id = ").push_bind(*event_id.as_uuid());
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(payment_status) = query.payment_status {
            builder
                .push(" AND payment_status = ")
                .push_bind(payment_status.as_str());
        }
        if let Some(term) = query.search_term() {
            let escaped = term
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            builder
                .push(" AND (customer_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR customer_email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR confirmation_code ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

impl BookingStore for PostgresStore {
    async fn save_event(&self, event: &Event) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, starts_at = EXCLUDED.starts_at, \
             capacity = EXCLUDED.capacity, auto_confirm = EXCLUDED.auto_confirm, \
             waitlist_enabled = EXCLUDED.waitlist_enabled"
        ))
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(event.starts_at)
        .bind(event.capacity.map(i64::from))
        .bind(event.auto_confirm)
        .bind(event.waitlist_enabled)
        .execute(&self.pool)
        .await
        .map_err(db("save event"))?;
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("get event"))?
        .map(Event::from))
    }

    async fn save_category(&self, category: &Category) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO categories ({CATEGORY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
             price_cents = EXCLUDED.price_cents, currency = EXCLUDED.currency, \
             capacity = EXCLUDED.capacity, sold = EXCLUDED.sold, \
             sale_starts_at = EXCLUDED.sale_starts_at, sale_ends_at = EXCLUDED.sale_ends_at, \
             zone = EXCLUDED.zone"
        ))
        .bind(category.id.as_uuid())
        .bind(category.event_id.as_uuid())
        .bind(&category.name)
        .bind(money_column(category.price))
        .bind(&category.currency)
        .bind(category.capacity.map(i64::from))
        .bind(i64::from(category.sold))
        .bind(category.sale_starts_at)
        .bind(category.sale_ends_at)
        .bind(category.zone.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db("save category"))?;
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("get category"))?
        .map(Category::from))
    }

    async fn save_element(&self, element: &FloorPlanElement) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO floor_plan_elements ({ELEMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label, kind = EXCLUDED.kind, \
             seats = EXCLUDED.seats"
        ))
        .bind(element.id.as_uuid())
        .bind(element.floor_plan_id.as_uuid())
        .bind(element.event_id.as_uuid())
        .bind(&element.label)
        .bind(element.kind.as_str())
        .bind(i64::from(element.seats))
        .execute(&self.pool)
        .await
        .map_err(db("save element"))?;
        Ok(())
    }

    async fn get_element(&self, id: ElementId) -> Result<Option<FloorPlanElement>> {
        sqlx::query_as::<_, ElementRow>(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM floor_plan_elements WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("get element"))?
        .map(FloorPlanElement::try_from)
        .transpose()
    }

    async fn save_credential(&self, credential: &UsageCredential) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO usage_credentials ({CREDENTIAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET code = EXCLUDED.code, \
             usage_limit = EXCLUDED.usage_limit, per_user_limit = EXCLUDED.per_user_limit, \
             used = EXCLUDED.used, active = EXCLUDED.active"
        ))
        .bind(credential.id.as_uuid())
        .bind(credential.kind.as_str())
        .bind(&credential.code)
        .bind(credential.usage_limit.map(i64::from))
        .bind(credential.per_user_limit.map(i64::from))
        .bind(i64::from(credential.used))
        .bind(credential.active)
        .execute(&self.pool)
        .await
        .map_err(db("save credential"))?;
        Ok(())
    }

    async fn get_credential(&self, id: CredentialId) -> Result<Option<UsageCredential>> {
        sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM usage_credentials WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("get credential"))?
        .map(UsageCredential::try_from)
        .transpose()
    }

    async fn ledger_snapshot(&self, request: &AdmissionRequest) -> Result<LedgerSnapshot> {
        let mut conn = self.pool.acquire().await.map_err(db("acquire connection"))?;
        Self::snapshot(&mut conn, request, false).await
    }

    async fn admit_booking(&self, request: &AdmissionRequest, booking: Booking) -> Result<Admission> {
        let mut tx = self.pool.begin().await.map_err(db("begin admission"))?;

        let snapshot = Self::snapshot(&mut tx, request, true).await?;
        let availability = AvailabilityChecker::check(&snapshot, request);
        if !availability.admitted {
            return Ok(Admission::Refused {
                availability,
                waitlist_open: snapshot.event.waitlist_enabled,
            });
        }
        if Self::code_taken(&mut tx, &booking.confirmation_code).await? {
            return Ok(Admission::CodeTaken);
        }

        if let Some(category_id) = request.category_id {
            let reserved = sqlx::query(
                "UPDATE categories SET sold = sold + $2 \
                 WHERE id = $1 AND (capacity IS NULL OR capacity = 0 OR sold + $2 <= capacity)",
            )
            .bind(category_id.as_uuid())
            .bind(i64::from(request.demand()))
            .execute(&mut *tx)
            .await
            .map_err(db("reserve category capacity"))?;
            if reserved.rows_affected() == 0 {
                return Ok(Admission::Refused {
                    availability: Availability {
                        admitted: false,
                        remaining: Some(0),
                        reason: "Category sold out".to_string(),
                    },
                    waitlist_open: snapshot.event.waitlist_enabled,
                });
            }
        }

        if let Err(error) = Self::insert_booking(&mut tx, &booking).await {
            let constraint = constraint_of(&error).map(str::to_owned);
            return match constraint.as_deref() {
                Some("bookings_element_exclusive") => Ok(Admission::Refused {
                    availability: Availability {
                        admitted: false,
                        remaining: Some(0),
                        reason: format!(
                            "{} is already taken",
                            booking.element_label.as_deref().unwrap_or("Element")
                        ),
                    },
                    waitlist_open: snapshot.event.waitlist_enabled,
                }),
                Some("bookings_confirmation_code_key") => Ok(Admission::CodeTaken),
                _ => Err(db("insert booking")(error)),
            };
        }

        tx.commit().await.map_err(db("commit admission"))?;
        Ok(Admission::Admitted(booking))
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("get booking"))?
        .map(Booking::try_from)
        .transpose()
    }

    async fn find_booking_by_code(&self, code: &ConfirmationCode) -> Result<Option<Booking>> {
        sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE confirmation_code = $1"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("find booking by code"))?
        .map(Booking::try_from)
        .transpose()
    }

    async fn list_bookings(&self, event_id: EventId, query: &BookingQuery) -> Result<Page<Booking>> {
        let mut counter = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings");
        Self::push_filters(&mut counter, event_id, query);
        let total = counter
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db("count bookings"))?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings"));
        Self::push_filters(&mut select, event_id, query);
        // Both fragments come from closed enums.
        select.push(format!(
            " ORDER BY {} {order}, id {order}",
            query.sort.column(),
            order = query.order.keyword()
        ));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset()));

        let items = select
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db("list bookings"))?
            .into_iter()
            .map(Booking::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    async fn update_booking<F, R>(&self, id: BookingId, f: F) -> Result<(Booking, R)>
    where
        F: FnOnce(&mut Booking) -> Result<R> + Send,
        R: Send,
    {
        let mut tx = self.pool.begin().await.map_err(db("begin booking update"))?;
        let current = Self::lock_booking(&mut tx, id).await?;

        let mut updated = current.clone();
        let result = f(&mut updated)?;

        sqlx::query(
            "UPDATE bookings SET status = $2, payment_status = $3, internal_notes = $4, \
             customer_notes = $5, checked_in_at = $6, checked_in_by = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(updated.status.as_str())
        .bind(updated.payment_status.as_str())
        .bind(updated.internal_notes.as_deref())
        .bind(updated.customer_notes.as_deref())
        .bind(updated.checked_in_at)
        .bind(updated.checked_in_by.as_deref())
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db("update booking"))?;

        if current.status.holds_inventory() && !updated.status.holds_inventory() {
            Self::release_category(&mut tx, &current).await?;
        }

        tx.commit().await.map_err(db("commit booking update"))?;
        Ok((updated, result))
    }

    async fn delete_booking(&self, id: BookingId) -> Result<Booking> {
        let mut tx = self.pool.begin().await.map_err(db("begin booking delete"))?;
        let booking = Self::lock_booking(&mut tx, id).await?;

        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db("delete booking"))?;
        sqlx::query(
            "INSERT INTO retired_confirmation_codes (code) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(booking.confirmation_code.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db("retire confirmation code"))?;
        if booking.status.holds_inventory() {
            Self::release_category(&mut tx, &booking).await?;
        }

        tx.commit().await.map_err(db("commit booking delete"))?;
        Ok(booking)
    }

    async fn get_waitlist_entry(&self, id: WaitlistEntryId) -> Result<Option<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistRow>(&format!(
            "SELECT {WAITLIST_COLUMNS} FROM waitlist_entries WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("get waitlist entry"))?
        .map(WaitlistEntry::try_from)
        .transpose()
    }

    async fn list_waitlist(&self, scope: WaitlistScope) -> Result<Vec<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistRow>(&format!(
            "SELECT {WAITLIST_COLUMNS} FROM waitlist_entries \
             WHERE scope_key = $1 ORDER BY position"
        ))
        .bind(scope.key())
        .fetch_all(&self.pool)
        .await
        .map_err(db("list waitlist"))?
        .into_iter()
        .map(WaitlistEntry::try_from)
        .collect()
    }

    async fn update_waitlist<F, R>(&self, scope: WaitlistScope, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<WaitlistEntry>) -> Result<R> + Send,
        R: Send,
    {
        let key = scope.key();
        let mut tx = self.pool.begin().await.map_err(db("begin waitlist update"))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(db("lock waitlist scope"))?;

        let mut entries = sqlx::query_as::<_, WaitlistRow>(&format!(
            "SELECT {WAITLIST_COLUMNS} FROM waitlist_entries \
             WHERE scope_key = $1 ORDER BY position"
        ))
        .bind(&key)
        .fetch_all(&mut *tx)
        .await
        .map_err(db("load waitlist"))?
        .into_iter()
        .map(WaitlistEntry::try_from)
        .collect::<Result<Vec<_>>>()?;
        let original: HashMap<WaitlistEntryId, WaitlistEntry> =
            entries.iter().map(|e| (e.id, e.clone())).collect();

        let result = f(&mut entries)?;

        if let Some(stray) = entries.iter().find(|e| e.scope() != scope) {
            return Err(BookingError::Conflict(format!(
                "waitlist entry {} does not belong to {scope}",
                stray.id
            )));
        }
        for entry in entries.iter().filter(|e| original.get(&e.id) != Some(*e)) {
            Self::upsert_waitlist_entry(&mut tx, entry).await?;
        }

        tx.commit().await.map_err(db("commit waitlist update"))?;
        Ok(result)
    }

    async fn scopes_with_lapsed_offers(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistScope>> {
        Ok(sqlx::query_as::<_, ScopeRow>(
            "SELECT DISTINCT event_id, category_id, element_id FROM waitlist_entries \
             WHERE status = 'notified' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db("find lapsed offers"))?
        .into_iter()
        .map(|row| {
            WaitlistScope::resolve(
                EventId::from_uuid(row.event_id),
                row.category_id.map(CategoryId::from_uuid),
                row.element_id.map(ElementId::from_uuid),
            )
        })
        .collect())
    }

    async fn redeem_usage(&self, record: UsageRecord) -> Result<UsageRecord> {
        let mut tx = self.pool.begin().await.map_err(db("begin redemption"))?;

        let credential: UsageCredential = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM usage_credentials WHERE id = $1 FOR UPDATE"
        ))
        .bind(record.credential_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db("lock credential"))?
        .ok_or_else(|| BookingError::not_found("credential", record.credential_id))?
        .try_into()?;
        if !credential.active {
            return Err(BookingError::invalid("credential_id", "credential is not active"));
        }

        let booking_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE id = $1)",
        )
        .bind(record.booking_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(db("check booking"))?;
        if !booking_exists {
            return Err(BookingError::not_found("booking", record.booking_id));
        }

        let already_applied = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM usage_records WHERE credential_id = $1 AND booking_id = $2)",
        )
        .bind(record.credential_id.as_uuid())
        .bind(record.booking_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(db("check usage"))?;
        if already_applied {
            return Err(BookingError::Conflict(format!(
                "credential already applied to booking {}",
                record.booking_id
            )));
        }

        let uses_by_user = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM usage_records WHERE credential_id = $1 AND user_identity = $2",
        )
        .bind(record.credential_id.as_uuid())
        .bind(record.user.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db("count usage"))?;
        ledger::check_usage_ceilings(&credential, count(uses_by_user))?;

        let inserted = sqlx::query(
            "INSERT INTO usage_records \
             (id, credential_id, booking_id, user_identity, discount_cents, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id.as_uuid())
        .bind(record.credential_id.as_uuid())
        .bind(record.booking_id.as_uuid())
        .bind(record.user.as_str())
        .bind(money_column(record.discount))
        .bind(record.recorded_at)
        .execute(&mut *tx)
        .await;
        if let Err(error) = inserted {
            return Err(if constraint_of(&error) == Some("usage_once_per_booking") {
                BookingError::Conflict(format!(
                    "credential already applied to booking {}",
                    record.booking_id
                ))
            } else {
                db("insert usage record")(error)
            });
        }

        let incremented = sqlx::query(
            "UPDATE usage_credentials SET used = used + 1 \
             WHERE id = $1 AND (usage_limit IS NULL OR usage_limit = 0 OR used < usage_limit)",
        )
        .bind(record.credential_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db("increment usage"))?;
        if incremented.rows_affected() == 0 {
            return Err(BookingError::UsageLimit {
                scope: "global",
                limit: credential.usage_limit.unwrap_or(0),
            });
        }

        tx.commit().await.map_err(db("commit redemption"))?;
        Ok(record)
    }
}
