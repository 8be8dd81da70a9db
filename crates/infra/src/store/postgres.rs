//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Corrupt` | Duplicate key outside an upsert |
//! | Database (foreign key violation) | `23503` | `Rejected` | Reference to an item that does not exist |
//! | Database (check constraint violation) | `23514` | `Corrupt` | Row would break a schema invariant |
//! | Database (other) | Any other | `Unavailable` | Serialization failures, deadlocks, ... |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` | Transient, retry the whole operation |
//! | ColumnDecode / other | N/A | `Corrupt` | Row did not decode into a domain type |
//!
//! ## Concurrency
//!
//! Sales and restocks take `SELECT … FOR UPDATE` on the one item row they
//! touch, inside a transaction that also writes the reservation. Different
//! items never share a lock. Interest registration relies on the
//! `(customer_email, item_id)` primary key and `INSERT … ON CONFLICT`.
//!
//! Dispatcher claims are a lease on the interest row: a conditional
//! `UPDATE … WHERE claimed_until IS NULL OR claimed_until < now()` sets
//! `claim_token`, so of two overlapping runs only one gets each customer.
//! Marking is conditional on the `revision` read at claim time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use quitute_core::{CustomerEmail, DomainError, ItemId, ReservationId};
use quitute_inventory::{InterestRecord, Item, Reservation, RestockEntry};

use super::{
    InterestRegistry, NotificationClaim, ReservationLog, RestockWrite, SaleReceipt, SaleRequest,
    StockLedger, StoreError, StoreResult, SubscriptionDirectory,
};
use crate::messaging::SubscriptionHandle;

const SCHEMA: &str = include_str!("../../migrations/0001_inventory.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn lock_item(
        tx: &mut Transaction<'_, Postgres>,
        item_id: ItemId,
    ) -> StoreResult<Option<Item>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, stock_quantity, available
            FROM items
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(item_id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn write_stock(tx: &mut Transaction<'_, Postgres>, item: &Item) -> StoreResult<()> {
        sqlx::query("UPDATE items SET stock_quantity = $2, available = $3 WHERE id = $1")
            .bind(item.id_typed().get())
            .bind(item.stock_quantity())
            .bind(item.available())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("write_stock", e))?;
        Ok(())
    }

    async fn rollback(tx: Transaction<'_, Postgres>) -> StoreResult<()> {
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn get_item(&self, item_id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query("SELECT id, name, stock_quantity, available FROM items WHERE id = $1")
            .bind(item_id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_items(&self) -> StoreResult<Vec<Item>> {
        let rows = sqlx::query("SELECT id, name, stock_quantity, available FROM items ORDER BY id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    #[instrument(
        skip(self, request),
        fields(item_id = %request.item_id, quantity = request.quantity),
        err
    )]
    async fn sell(&self, request: SaleRequest) -> StoreResult<SaleReceipt> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let Some(mut item) = Self::lock_item(&mut tx, request.item_id).await? else {
            Self::rollback(tx).await?;
            return Err(DomainError::NotFound(request.item_id).into());
        };

        let reservation = match item.sell(request.quantity).and_then(|_| {
            Reservation::confirmed(
                request.item_id,
                request.customer_email.clone(),
                request.quantity,
                Utc::now(),
            )
        }) {
            Ok(reservation) => reservation,
            Err(rejection) => {
                Self::rollback(tx).await?;
                return Err(rejection.into());
            }
        };

        Self::write_stock(&mut tx, &item).await?;

        sqlx::query(
            r#"
            INSERT INTO reservations (id, item_id, customer_email, quantity, confirmed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*reservation.id.as_uuid())
        .bind(reservation.item_id.get())
        .bind(reservation.customer_email.as_str())
        .bind(reservation.quantity)
        .bind(reservation.confirmed)
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(SaleReceipt { item, reservation })
    }

    #[instrument(
        skip(self, entry),
        fields(item_id = %entry.item_id, quantity = entry.quantity),
        err
    )]
    async fn restock(&self, entry: &RestockEntry) -> StoreResult<RestockWrite> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Some(mut item) = Self::lock_item(&mut tx, entry.item_id).await? {
            let change = match item.restock(entry.quantity) {
                Ok(change) => change,
                Err(rejection) => {
                    Self::rollback(tx).await?;
                    return Err(rejection.into());
                }
            };
            Self::write_stock(&mut tx, &item).await?;
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            return Ok(RestockWrite {
                item,
                inserted: false,
                transitioned: change.became_available(),
            });
        }

        // No row to lock: build the new item through the domain, then upsert in
        // case a concurrent caller created it since our SELECT.
        let mut fresh = Item::new(entry.item_id, entry.name.clone())?;
        fresh.restock(entry.quantity)?;

        let row = sqlx::query(
            r#"
            INSERT INTO items (id, name, stock_quantity, available)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET stock_quantity = items.stock_quantity + EXCLUDED.stock_quantity,
                    available = (items.stock_quantity + EXCLUDED.stock_quantity) > 0
            RETURNING id, name, stock_quantity, available, (xmax = 0) AS inserted
            "#,
        )
        .bind(fresh.id_typed().get())
        .bind(fresh.name())
        .bind(fresh.stock_quantity())
        .bind(fresh.available())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_item", e))?;

        let inserted: bool = row
            .try_get("inserted")
            .map_err(|e| map_sqlx_error("upsert_item", e))?;
        let item = item_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        // On conflict the row existed with `stock - quantity` units before us.
        let before = item.stock_quantity() - entry.quantity;
        Ok(RestockWrite {
            transitioned: !inserted && before == 0 && item.available(),
            inserted,
            item,
        })
    }

    #[instrument(skip(self, item), fields(item_id = %item.id_typed()), err)]
    async fn seed(&self, item: Item) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO items (id, name, stock_quantity, available)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(item.id_typed().get())
        .bind(item.name())
        .bind(item.stock_quantity())
        .bind(item.available())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed_item", e))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl InterestRegistry for PostgresStore {
    #[instrument(skip(self), fields(customer = %customer_email, item_id = %item_id), err)]
    async fn register_interest(
        &self,
        customer_email: &CustomerEmail,
        item_id: ItemId,
        desired_quantity: Option<i64>,
    ) -> StoreResult<InterestRecord> {
        // Validates the quantity before touching the table.
        let candidate =
            InterestRecord::new(customer_email.clone(), item_id, desired_quantity, Utc::now())?;

        let row = sqlx::query(
            r#"
            INSERT INTO interest_records
                (customer_email, item_id, desired_quantity, notified, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, $4, $4)
            ON CONFLICT (customer_email, item_id) DO UPDATE
                SET notified = FALSE,
                    revision = interest_records.revision + 1,
                    desired_quantity = COALESCE($5, interest_records.desired_quantity),
                    updated_at = EXCLUDED.updated_at
            RETURNING customer_email, item_id, desired_quantity, notified, revision, created_at
            "#,
        )
        .bind(candidate.customer_email.as_str())
        .bind(item_id.get())
        .bind(candidate.desired_quantity)
        .bind(candidate.created_at)
        .bind(desired_quantity)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::Rejected(DomainError::NotFound(item_id))
            } else {
                map_sqlx_error("register_interest", e)
            }
        })?;

        interest_from_row(&row)
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn interests_for_item(&self, item_id: ItemId) -> StoreResult<Vec<InterestRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT customer_email, item_id, desired_quantity, notified, revision, created_at
            FROM interest_records
            WHERE item_id = $1
            ORDER BY created_at ASC, customer_email ASC
            "#,
        )
        .bind(item_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("interests_for_item", e))?;

        rows.iter().map(interest_from_row).collect()
    }

    #[instrument(skip(self), fields(customer = %customer_email, item_id = %item_id), err)]
    async fn claim_pending(
        &self,
        customer_email: &CustomerEmail,
        item_id: ItemId,
        lease: Duration,
    ) -> StoreResult<Option<NotificationClaim>> {
        let token = uuid::Uuid::now_v7();

        let row = sqlx::query(
            r#"
            UPDATE interest_records
            SET claim_token = $3,
                claimed_until = now() + make_interval(secs => $4)
            WHERE customer_email = $1 AND item_id = $2 AND notified = FALSE
              AND (claimed_until IS NULL OR claimed_until < now())
            RETURNING customer_email, item_id, desired_quantity, notified, revision,
                      created_at, claimed_until
            "#,
        )
        .bind(customer_email.as_str())
        .bind(item_id.get())
        .bind(token)
        .bind(lease.as_secs_f64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_pending", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row
            .try_get("claimed_until")
            .map_err(|e| StoreError::Corrupt(format!("failed to decode claim: {}", e)))?;
        Ok(Some(NotificationClaim {
            record: interest_from_row(&row)?,
            token,
            expires_at,
        }))
    }

    #[instrument(
        skip(self, claim),
        fields(customer = %claim.record.customer_email, item_id = %claim.record.item_id),
        err
    )]
    async fn mark_notified(&self, claim: &NotificationClaim) -> StoreResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_mark_notified", e))?;

        let marked = sqlx::query(
            r#"
            UPDATE interest_records
            SET notified = TRUE, updated_at = now()
            WHERE customer_email = $1 AND item_id = $2
              AND notified = FALSE AND revision = $3
            "#,
        )
        .bind(claim.record.customer_email.as_str())
        .bind(claim.record.item_id.get())
        .bind(claim.record.revision)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_notified", e))?
        .rows_affected()
            == 1;

        release(&mut *tx, claim).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_mark_notified", e))?;
        Ok(marked)
    }

    #[instrument(
        skip(self, claim),
        fields(customer = %claim.record.customer_email, item_id = %claim.record.item_id),
        err
    )]
    async fn release_claim(&self, claim: &NotificationClaim) -> StoreResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_release_claim", e))?;
        release(&mut *conn, claim).await
    }
}

/// Clear the claim if it is still ours; a lapsed and re-taken claim is left alone.
async fn release(conn: &mut sqlx::PgConnection, claim: &NotificationClaim) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE interest_records
        SET claim_token = NULL, claimed_until = NULL
        WHERE customer_email = $1 AND item_id = $2 AND claim_token = $3
        "#,
    )
    .bind(claim.record.customer_email.as_str())
    .bind(claim.record.item_id.get())
    .bind(claim.token)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("release_claim", e))?;
    Ok(())
}

#[async_trait]
impl ReservationLog for PostgresStore {
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn reservations_for_item(&self, item_id: ItemId) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, customer_email, quantity, confirmed, created_at
            FROM reservations
            WHERE item_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(item_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reservations_for_item", e))?;

        rows.iter().map(reservation_from_row).collect()
    }
}

#[async_trait]
impl SubscriptionDirectory for PostgresStore {
    #[instrument(skip(self, handle), fields(customer = %customer_email), err)]
    async fn record_subscription(
        &self,
        customer_email: &CustomerEmail,
        handle: &SubscriptionHandle,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_subscriptions (email, subscription_handle, subscribed, created_at)
            VALUES ($1, $2, TRUE, $3)
            ON CONFLICT (email) DO UPDATE
                SET subscription_handle = EXCLUDED.subscription_handle,
                    subscribed = TRUE
            "#,
        )
        .bind(customer_email.as_str())
        .bind(handle.as_str())
        .bind(Utc::now())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_subscription", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(customer = %customer_email), err)]
    async fn is_subscribed(&self, customer_email: &CustomerEmail) -> StoreResult<bool> {
        let subscribed: Option<bool> =
            sqlx::query_scalar("SELECT subscribed FROM email_subscriptions WHERE email = $1")
                .bind(customer_email.as_str())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("is_subscribed", e))?;
        Ok(subscribed.unwrap_or(false))
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Corrupt(msg),
                // Foreign key violation
                Some("23503") => StoreError::Rejected(DomainError::validation(msg)),
                // Check constraint violation
                Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(io) => StoreError::Unavailable(format!("io error in {}: {}", operation, io)),
        sqlx::Error::Tls(tls) => {
            StoreError::Unavailable(format!("tls error in {}: {}", operation, tls))
        }
        _ => StoreError::Corrupt(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a foreign key violation.
fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23503";
        }
    }
    false
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> StoreResult<T> {
    T::from_row(row).map_err(|e| StoreError::Corrupt(format!("failed to decode row: {}", e)))
}

fn item_from_row(row: &PgRow) -> StoreResult<Item> {
    decode::<ItemRow>(row)?.try_into()
}

fn interest_from_row(row: &PgRow) -> StoreResult<InterestRecord> {
    decode::<InterestRow>(row)?.try_into()
}

fn reservation_from_row(row: &PgRow) -> StoreResult<Reservation> {
    decode::<ReservationRow>(row)?.try_into()
}

fn corrupt(err: DomainError) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

// SQLx row types

#[derive(Debug)]
struct ItemRow {
    id: i64,
    name: String,
    stock_quantity: i64,
    available: bool,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            stock_quantity: row.try_get("stock_quantity")?,
            available: row.try_get("available")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let id = ItemId::try_new(row.id).map_err(corrupt)?;
        Item::from_parts(id, row.name, row.stock_quantity, row.available).map_err(corrupt)
    }
}

#[derive(Debug)]
struct InterestRow {
    customer_email: String,
    item_id: i64,
    desired_quantity: i64,
    notified: bool,
    revision: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for InterestRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InterestRow {
            customer_email: row.try_get("customer_email")?,
            item_id: row.try_get("item_id")?,
            desired_quantity: row.try_get("desired_quantity")?,
            notified: row.try_get("notified")?,
            revision: row.try_get("revision")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<InterestRow> for InterestRecord {
    type Error = StoreError;

    fn try_from(row: InterestRow) -> Result<Self, Self::Error> {
        Ok(InterestRecord {
            customer_email: CustomerEmail::parse(&row.customer_email).map_err(corrupt)?,
            item_id: ItemId::try_new(row.item_id).map_err(corrupt)?,
            desired_quantity: row.desired_quantity,
            notified: row.notified,
            revision: row.revision,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct ReservationRow {
    id: uuid::Uuid,
    item_id: i64,
    customer_email: String,
    quantity: i64,
    confirmed: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            customer_email: row.try_get("customer_email")?,
            quantity: row.try_get("quantity")?,
            confirmed: row.try_get("confirmed")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.id),
            item_id: ItemId::try_new(row.item_id).map_err(corrupt)?,
            customer_email: CustomerEmail::parse(&row.customer_email).map_err(corrupt)?,
            quantity: row.quantity,
            confirmed: row.confirmed,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_every_table() {
        for table in ["items", "reservations", "interest_records", "email_subscriptions"] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn interest_rows_carry_revision_and_claim_lease() {
        for column in ["revision", "claim_token", "claimed_until"] {
            assert!(SCHEMA.contains(column), "missing column {column}");
        }
    }

    #[test]
    fn pool_errors_are_transient() {
        assert!(matches!(
            map_sqlx_error("sell", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("sell", sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("sell", sqlx::Error::RowNotFound),
            StoreError::Corrupt(_)
        ));
    }

    #[test]
    fn inconsistent_rows_are_reported_as_corrupt() {
        let row = ItemRow {
            id: 7,
            name: "coxinha".into(),
            stock_quantity: 0,
            available: true,
        };
        assert!(matches!(Item::try_from(row), Err(StoreError::Corrupt(_))));
    }
}
