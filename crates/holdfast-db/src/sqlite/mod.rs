//! # SQLite Store
//!
//! [`DocumentStore`] and [`ProductCatalog`] backed by SQLite through sqlx.
//!
//! ## Commit Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   for each write:                                                       │
//! │     Version(v)    UPDATE .. SET .., version = v + 1                     │
//! │                   WHERE key = ? AND version = v                         │
//! │                   0 rows ──► ROLLBACK, Conflict                         │
//! │     MustNotExist  INSERT .. version = 1                                 │
//! │                   UNIQUE violation ──► ROLLBACK, Conflict               │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The partial unique index on `(holder_key, product_id) WHERE status =
//! 'active'` turns a second concurrent hold into a conflict as well.

mod rows;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holdfast_core::{
    Holder, ProductId, ProductInfo, Reservation, ReservationId, ReservationStatus, StockAggregate,
};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::pool::{Database, DbConfig};
use crate::store::{DocumentStore, Precondition, ProductCatalog, Versioned, Write, WriteBatch};
use rows::{encode_timestamp, ProductRow, ReservationRow, StockRow};

const RESERVATION_COLUMNS: &str =
    "id, holder_key, product_id, quantity, status, created_at, updated_at, expires_at, version";

/// SQLite-backed document store.
///
/// ## Usage
/// ```rust,ignore
/// let store = SqliteStore::open(DbConfig::new("holdfast.db")).await?;
/// store.upsert_product(&ProductInfo::new("MUG", "Mug", 40)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    /// Opens the pool and applies migrations.
    pub async fn open(config: DbConfig) -> StoreResult<Self> {
        Ok(SqliteStore::new(Database::new(config).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Adds or replaces a catalog entry and (re)initializes its ledger.
    ///
    /// Units already held stay held; the rest of the new total becomes
    /// available. Fails if the new total is below what is currently held.
    pub async fn upsert_product(&self, product: &ProductInfo) -> StoreResult<StockAggregate> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                product_id, name, total_stock, max_order_quantity,
                min_order_quantity, is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (product_id) DO UPDATE SET
                name = excluded.name,
                total_stock = excluded.total_stock,
                max_order_quantity = excluded.max_order_quantity,
                min_order_quantity = excluded.min_order_quantity,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(product.total_stock)
        .bind(product.max_order_quantity)
        .bind(product.min_order_quantity)
        .bind(product.is_active)
        .bind(encode_timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        let existing: Option<StockRow> = sqlx::query_as(
            "SELECT product_id, total_stock, available_stock, reserved_stock, version FROM stock WHERE product_id = ?1",
        )
        .bind(product.product_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let stock = match existing {
            None => {
                let stock = StockAggregate::new(product.product_id.clone(), product.total_stock);
                write_stock(&mut tx, &stock, Precondition::MustNotExist).await?;
                stock
            }
            Some(row) => {
                let current = Versioned::<StockAggregate>::try_from(row)?;
                let available = product.total_stock - current.doc.reserved_stock;
                if available < 0 {
                    return Err(StoreError::QueryFailed(format!(
                        "total_stock {} for {} is below the {} units currently held",
                        product.total_stock, product.product_id, current.doc.reserved_stock
                    )));
                }
                let stock = StockAggregate {
                    total_stock: product.total_stock,
                    available_stock: available,
                    ..current.doc.clone()
                };
                write_stock(&mut tx, &stock, current.unchanged()).await?;
                stock
            }
        };

        tx.commit().await?;
        info!(product_id = %product.product_id, total = product.total_stock, "Product upserted");
        Ok(stock)
    }

    /// Number of catalog entries.
    pub async fn product_count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    async fn fetch_reservations(&self, sql: &str, binds: &[&str]) -> StoreResult<Vec<Versioned<Reservation>>> {
        let mut query = sqlx::query_as::<_, ReservationRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        query
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(Versioned::try_from)
            .collect()
    }
}

// =============================================================================
// Writes
// =============================================================================

async fn write_stock(
    conn: &mut SqliteConnection,
    doc: &StockAggregate,
    precondition: Precondition,
) -> StoreResult<()> {
    let next = precondition.next_version() as i64;

    match precondition {
        Precondition::MustNotExist => {
            sqlx::query(
                r#"
                INSERT INTO stock (product_id, total_stock, available_stock, reserved_stock, version)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(doc.product_id.as_str())
            .bind(doc.total_stock)
            .bind(doc.available_stock)
            .bind(doc.reserved_stock)
            .bind(next)
            .execute(&mut *conn)
            .await?;
        }
        Precondition::Version(expected) => {
            let result = sqlx::query(
                r#"
                UPDATE stock
                SET total_stock = ?2, available_stock = ?3, reserved_stock = ?4, version = ?5
                WHERE product_id = ?1 AND version = ?6
                "#,
            )
            .bind(doc.product_id.as_str())
            .bind(doc.total_stock)
            .bind(doc.available_stock)
            .bind(doc.reserved_stock)
            .bind(next)
            .bind(expected as i64)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::conflict(format!("stock/{}", doc.product_id)));
            }
        }
    }
    Ok(())
}

async fn write_reservation(
    conn: &mut SqliteConnection,
    doc: &Reservation,
    precondition: Precondition,
) -> StoreResult<()> {
    let next = precondition.next_version() as i64;

    match precondition {
        Precondition::MustNotExist => {
            sqlx::query(
                r#"
                INSERT INTO reservations (
                    id, holder_key, product_id, quantity, status,
                    created_at, updated_at, expires_at, version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(doc.id.to_string())
            .bind(doc.holder.key())
            .bind(doc.product_id.as_str())
            .bind(doc.quantity)
            .bind(doc.status.as_str())
            .bind(encode_timestamp(doc.created_at))
            .bind(encode_timestamp(doc.updated_at))
            .bind(encode_timestamp(doc.expires_at))
            .bind(next)
            .execute(&mut *conn)
            .await?;
        }
        Precondition::Version(expected) => {
            let result = sqlx::query(
                r#"
                UPDATE reservations
                SET quantity = ?2, status = ?3, updated_at = ?4, expires_at = ?5, version = ?6
                WHERE id = ?1 AND version = ?7
                "#,
            )
            .bind(doc.id.to_string())
            .bind(doc.quantity)
            .bind(doc.status.as_str())
            .bind(encode_timestamp(doc.updated_at))
            .bind(encode_timestamp(doc.expires_at))
            .bind(next)
            .bind(expected as i64)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::conflict(format!("reservation/{}", doc.id)));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Trait Implementations
// =============================================================================

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_stock(&self, product_id: &ProductId) -> StoreResult<Option<Versioned<StockAggregate>>> {
        let row: Option<StockRow> = sqlx::query_as(
            "SELECT product_id, total_stock, available_stock, reserved_stock, version FROM stock WHERE product_id = ?1",
        )
        .bind(product_id.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        row.map(Versioned::try_from).transpose()
    }

    async fn get_reservation(&self, id: &ReservationId) -> StoreResult<Option<Versioned<Reservation>>> {
        let sql = format!("SELECT {} FROM reservations WHERE id = ?1", RESERVATION_COLUMNS);
        let id = id.to_string();
        Ok(self.fetch_reservations(&sql, &[&id]).await?.into_iter().next())
    }

    async fn find_active_reservations(
        &self,
        holder: &Holder,
        product_id: &ProductId,
    ) -> StoreResult<Vec<Versioned<Reservation>>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE holder_key = ?1 AND product_id = ?2 AND status = '{}'",
            RESERVATION_COLUMNS,
            ReservationStatus::Active.as_str()
        );
        let key = holder.key();
        self.fetch_reservations(&sql, &[&key, product_id.as_str()]).await
    }

    async fn find_holder_reservations(&self, holder: &Holder) -> StoreResult<Vec<Versioned<Reservation>>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE holder_key = ?1 AND status = '{}' ORDER BY created_at",
            RESERVATION_COLUMNS,
            ReservationStatus::Active.as_str()
        );
        let key = holder.key();
        self.fetch_reservations(&sql, &[&key]).await
    }

    async fn query_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Versioned<Reservation>>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE status = '{}' AND expires_at <= ?1 ORDER BY expires_at LIMIT ?2",
            RESERVATION_COLUMNS,
            ReservationStatus::Active.as_str()
        );
        let rows: Vec<ReservationRow> = sqlx::query_as(&sql)
            .bind(encode_timestamp(now))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.db.pool())
            .await?;

        // One undecodable row must not stall every later sweep.
        let mut expired = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match Versioned::try_from(row) {
                Ok(reservation) => expired.push(reservation),
                Err(e) => warn!(reservation_id = %id, error = %e, "Skipping undecodable expired reservation"),
            }
        }
        Ok(expired)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;
        for write in batch.writes() {
            // Returning early drops `tx`, which rolls back.
            match write {
                Write::Stock { doc, precondition } => write_stock(&mut tx, doc, *precondition).await?,
                Write::Reservation { doc, precondition } => {
                    write_reservation(&mut tx, doc, *precondition).await?
                }
            }
        }
        tx.commit().await?;

        debug!(writes = batch.len(), "Batch committed");
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for SqliteStore {
    async fn get_product(&self, product_id: &ProductId) -> StoreResult<Option<ProductInfo>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT product_id, name, total_stock, max_order_quantity, min_order_quantity, is_active
            FROM products
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(ProductInfo::from))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store_with(product: &str, total: i64) -> SqliteStore {
        let store = SqliteStore::open(DbConfig::in_memory()).await.unwrap();
        store
            .upsert_product(&ProductInfo::new(product, product, total))
            .await
            .unwrap();
        store
    }

    fn hold(product: &str, holder: &str, quantity: i64, now: DateTime<Utc>) -> Reservation {
        Reservation::open(
            Holder::User(holder.to_string()),
            ProductId::new(product),
            quantity,
            now,
            Duration::minutes(15),
        )
    }

    #[tokio::test]
    async fn test_upsert_and_read_product() {
        let store = store_with("LAMP", 7).await;
        let product = store.get_product(&ProductId::new("LAMP")).await.unwrap().unwrap();
        assert_eq!(product.total_stock, 7);
        assert!(product.is_active);

        let stock = store.get_stock(&ProductId::new("LAMP")).await.unwrap().unwrap();
        assert_eq!(stock.version, 1);
        assert_eq!(stock.doc.available_stock, 7);
        assert_eq!(store.product_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_roundtrip() {
        let store = store_with("LAMP", 7).await;
        let stock = store.get_stock(&ProductId::new("LAMP")).await.unwrap().unwrap();
        let reservation = hold("LAMP", "u-1", 3, Utc::now());

        store
            .commit(
                WriteBatch::new()
                    .put_stock(stock.doc.hold(3).unwrap(), stock.unchanged())
                    .put_reservation(reservation.clone(), Precondition::MustNotExist),
            )
            .await
            .unwrap();

        let stored = store.get_reservation(&reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.doc.holder, reservation.holder);
        assert_eq!(stored.doc.quantity, 3);

        let active = store
            .find_active_reservations(&reservation.holder, &ProductId::new("LAMP"))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let stock = store.get_stock(&ProductId::new("LAMP")).await.unwrap().unwrap();
        assert_eq!((stock.doc.available_stock, stock.doc.reserved_stock, stock.version), (4, 3, 2));
    }

    #[tokio::test]
    async fn test_stale_update_rolls_back_whole_batch() {
        let store = store_with("LAMP", 7).await;
        let stale = store.get_stock(&ProductId::new("LAMP")).await.unwrap().unwrap();
        store
            .commit(WriteBatch::new().put_stock(stale.doc.hold(1).unwrap(), stale.unchanged()))
            .await
            .unwrap();

        let reservation = hold("LAMP", "u-1", 2, Utc::now());
        let err = store
            .commit(
                WriteBatch::new()
                    .put_reservation(reservation.clone(), Precondition::MustNotExist)
                    .put_stock(stale.doc.hold(2).unwrap(), stale.unchanged()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.get_reservation(&reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_active_hold_is_conflict() {
        let store = store_with("LAMP", 7).await;
        let now = Utc::now();

        store
            .commit(WriteBatch::new().put_reservation(hold("LAMP", "u-1", 1, now), Precondition::MustNotExist))
            .await
            .unwrap();
        let err = store
            .commit(WriteBatch::new().put_reservation(hold("LAMP", "u-1", 2, now), Precondition::MustNotExist))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_query_expired_skips_undecodable_rows() {
        let store = store_with("LAMP", 7).await;
        let now = Utc::now();

        // A blank holder key cannot be parsed back into a Holder.
        let mut broken = hold("LAMP", "", 1, now - Duration::minutes(30));
        broken.expires_at = now - Duration::minutes(20);
        let mut good = hold("LAMP", "u-2", 2, now - Duration::minutes(30));
        good.expires_at = now - Duration::minutes(10);
        store
            .commit(
                WriteBatch::new()
                    .put_reservation(broken, Precondition::MustNotExist)
                    .put_reservation(good.clone(), Precondition::MustNotExist),
            )
            .await
            .unwrap();

        let expired = store.query_expired(now, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].doc.id, good.id);
    }

    #[tokio::test]
    async fn test_query_expired() {
        let store = store_with("LAMP", 7).await;
        let now = Utc::now();

        let mut old = hold("LAMP", "u-1", 1, now - Duration::minutes(30));
        old.expires_at = now - Duration::minutes(15);
        let fresh = hold("LAMP", "u-2", 1, now);
        store
            .commit(
                WriteBatch::new()
                    .put_reservation(old.clone(), Precondition::MustNotExist)
                    .put_reservation(fresh, Precondition::MustNotExist),
            )
            .await
            .unwrap();

        let expired = store.query_expired(now, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].doc.id, old.id);
    }

    #[tokio::test]
    async fn test_restock_keeps_holds() {
        let store = store_with("LAMP", 5).await;
        let stock = store.get_stock(&ProductId::new("LAMP")).await.unwrap().unwrap();
        store
            .commit(WriteBatch::new().put_stock(stock.doc.hold(4).unwrap(), stock.unchanged()))
            .await
            .unwrap();

        let restocked = store.upsert_product(&ProductInfo::new("LAMP", "LAMP", 8)).await.unwrap();
        assert_eq!((restocked.available_stock, restocked.reserved_stock), (4, 4));
        assert!(store.upsert_product(&ProductInfo::new("LAMP", "LAMP", 2)).await.is_err());
    }
}
