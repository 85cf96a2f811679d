//! # In-Memory Store
//!
//! [`DocumentStore`] and [`ProductCatalog`] over plain maps. Used by the
//! engine's tests and for local development.
//!
//! A single `tokio::sync::RwLock` guards every map. Reads take the read
//! lock; `commit` holds the write lock while it checks all preconditions and
//! applies the batch, which makes check-and-apply atomic.
//!
//! ## Fault Injection
//! ```text
//! store.inject_conflicts(3)    next 3 commits fail with Conflict
//! store.set_unavailable(true)  every call fails with ConnectionFailed
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holdfast_core::{
    Holder, ProductId, ProductInfo, Reservation, ReservationId, ReservationStatus, StockAggregate,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{DocumentStore, Precondition, ProductCatalog, Versioned, Write, WriteBatch};

#[derive(Debug, Default)]
struct Documents {
    products: HashMap<ProductId, ProductInfo>,
    stock: HashMap<ProductId, Versioned<StockAggregate>>,
    reservations: HashMap<ReservationId, Versioned<Reservation>>,
}

impl Documents {
    fn current_version(&self, write: &Write) -> Option<u64> {
        match write {
            Write::Stock { doc, .. } => self.stock.get(&doc.product_id).map(|v| v.version),
            Write::Reservation { doc, .. } => self.reservations.get(&doc.id).map(|v| v.version),
        }
    }

    fn active_for(&self, holder: &Holder, product_id: &ProductId) -> impl Iterator<Item = &Versioned<Reservation>> {
        let holder = holder.clone();
        let product_id = product_id.clone();
        self.reservations.values().filter(move |r| {
            r.doc.status == ReservationStatus::Active && r.doc.holder == holder && r.doc.product_id == product_id
        })
    }
}

/// In-memory document store and catalog.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    docs: RwLock<Documents>,
    pending_conflicts: AtomicU32,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog entry and (re)initializes its ledger.
    ///
    /// Units already held stay held; the rest of the new total becomes
    /// available. Fails if the new total is below what is currently held.
    pub async fn upsert_product(&self, product: ProductInfo) -> StoreResult<StockAggregate> {
        let mut docs = self.docs.write().await;

        let stock = match docs.stock.get(&product.product_id) {
            Some(existing) => restocked(&existing.doc, product.total_stock)?,
            None => StockAggregate::new(product.product_id.clone(), product.total_stock),
        };
        let version = docs
            .stock
            .get(&product.product_id)
            .map(|v| v.version + 1)
            .unwrap_or(1);

        debug!(product_id = %product.product_id, total = product.total_stock, "Upserting product");
        docs.stock
            .insert(product.product_id.clone(), Versioned::new(stock.clone(), version));
        docs.products.insert(product.product_id.clone(), product);
        Ok(stock)
    }

    /// Stores a reservation without any precondition or uniqueness check.
    ///
    /// Lets tests set up states the engine itself would never produce.
    pub async fn put_reservation_unchecked(&self, reservation: Reservation) {
        let mut docs = self.docs.write().await;
        let version = docs.reservations.get(&reservation.id).map(|v| v.version + 1).unwrap_or(1);
        docs.reservations
            .insert(reservation.id, Versioned::new(reservation, version));
    }

    /// Every ledger, sorted by product id.
    pub async fn all_stock(&self) -> Vec<StockAggregate> {
        let docs = self.docs.read().await;
        let mut stock: Vec<StockAggregate> = docs.stock.values().map(|v| v.doc.clone()).collect();
        stock.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        stock
    }

    /// Every reservation in any status.
    pub async fn all_reservations(&self) -> Vec<Reservation> {
        let docs = self.docs.read().await;
        docs.reservations.values().map(|v| v.doc.clone()).collect()
    }

    /// Makes the next `count` commits fail with a conflict before checking anything.
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes every call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionFailed("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn restocked(existing: &StockAggregate, total_stock: i64) -> StoreResult<StockAggregate> {
    let available = total_stock - existing.reserved_stock;
    if available < 0 {
        return Err(StoreError::QueryFailed(format!(
            "total_stock {} for {} is below the {} units currently held",
            total_stock, existing.product_id, existing.reserved_stock
        )));
    }
    Ok(StockAggregate {
        total_stock,
        available_stock: available,
        ..existing.clone()
    })
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_stock(&self, product_id: &ProductId) -> StoreResult<Option<Versioned<StockAggregate>>> {
        self.ensure_available()?;
        Ok(self.docs.read().await.stock.get(product_id).cloned())
    }

    async fn get_reservation(&self, id: &ReservationId) -> StoreResult<Option<Versioned<Reservation>>> {
        self.ensure_available()?;
        Ok(self.docs.read().await.reservations.get(id).cloned())
    }

    async fn find_active_reservations(
        &self,
        holder: &Holder,
        product_id: &ProductId,
    ) -> StoreResult<Vec<Versioned<Reservation>>> {
        self.ensure_available()?;
        let docs = self.docs.read().await;
        Ok(docs.active_for(holder, product_id).cloned().collect())
    }

    async fn find_holder_reservations(&self, holder: &Holder) -> StoreResult<Vec<Versioned<Reservation>>> {
        self.ensure_available()?;
        let docs = self.docs.read().await;
        let mut found: Vec<_> = docs
            .reservations
            .values()
            .filter(|r| r.doc.status == ReservationStatus::Active && &r.doc.holder == holder)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.doc.created_at);
        Ok(found)
    }

    async fn query_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Versioned<Reservation>>> {
        self.ensure_available()?;
        let docs = self.docs.read().await;
        let mut expired: Vec<_> = docs
            .reservations
            .values()
            .filter(|r| r.doc.status == ReservationStatus::Active && r.doc.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.doc.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.ensure_available()?;
        if self.take_injected_conflict() {
            debug!("Injected conflict");
            return Err(StoreError::conflict("injected"));
        }

        let mut docs = self.docs.write().await;

        // Check every precondition before touching anything.
        let mut seen = HashSet::new();
        for write in batch.writes() {
            let key = write.document_key();
            if !seen.insert(key.clone()) {
                return Err(StoreError::Internal(format!("{} written twice in one batch", key)));
            }

            let precondition = match write {
                Write::Stock { precondition, .. } | Write::Reservation { precondition, .. } => *precondition,
            };
            let holds = match (precondition, docs.current_version(write)) {
                (Precondition::MustNotExist, None) => true,
                (Precondition::Version(expected), Some(current)) => expected == current,
                _ => false,
            };
            if !holds {
                return Err(StoreError::conflict(key));
            }

            // Mirrors the partial unique index of the SQLite schema.
            if let Write::Reservation { doc, .. } = write {
                if doc.status == ReservationStatus::Active
                    && docs.active_for(&doc.holder, &doc.product_id).any(|r| r.doc.id != doc.id)
                {
                    return Err(StoreError::conflict(key));
                }
            }
        }

        for write in batch.writes() {
            match write {
                Write::Stock { doc, precondition } => {
                    docs.stock.insert(
                        doc.product_id.clone(),
                        Versioned::new(doc.clone(), precondition.next_version()),
                    );
                }
                Write::Reservation { doc, precondition } => {
                    docs.reservations
                        .insert(doc.id, Versioned::new(doc.clone(), precondition.next_version()));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn get_product(&self, product_id: &ProductId) -> StoreResult<Option<ProductInfo>> {
        self.ensure_available()?;
        Ok(self.docs.read().await.products.get(product_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hold(product: &str, holder: &str, quantity: i64) -> Reservation {
        Reservation::open(
            Holder::Session(holder.to_string()),
            ProductId::new(product),
            quantity,
            Utc::now(),
            Duration::minutes(15),
        )
    }

    #[tokio::test]
    async fn test_upsert_creates_ledger() {
        let store = InMemoryStore::new();
        store.upsert_product(ProductInfo::new("SOCKS", "Socks", 12)).await.unwrap();

        let stock = store.get_stock(&ProductId::new("SOCKS")).await.unwrap().unwrap();
        assert_eq!(stock.version, 1);
        assert_eq!(stock.doc.available_stock, 12);
        assert!(store.get_product(&ProductId::new("SOCKS")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_bumps_versions() {
        let store = InMemoryStore::new();
        store.upsert_product(ProductInfo::new("SOCKS", "Socks", 12)).await.unwrap();

        let stock = store.get_stock(&ProductId::new("SOCKS")).await.unwrap().unwrap();
        let reservation = hold("SOCKS", "s-1", 2);
        let batch = WriteBatch::new()
            .put_stock(stock.doc.hold(2).unwrap(), stock.unchanged())
            .put_reservation(reservation.clone(), Precondition::MustNotExist);
        store.commit(batch).await.unwrap();

        let stock = store.get_stock(&ProductId::new("SOCKS")).await.unwrap().unwrap();
        assert_eq!(stock.version, 2);
        assert_eq!(stock.doc.reserved_stock, 2);
        let stored = store.get_reservation(&reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_applies_nothing() {
        let store = InMemoryStore::new();
        store.upsert_product(ProductInfo::new("SOCKS", "Socks", 12)).await.unwrap();
        let stale = store.get_stock(&ProductId::new("SOCKS")).await.unwrap().unwrap();

        store
            .commit(WriteBatch::new().put_stock(stale.doc.hold(1).unwrap(), stale.unchanged()))
            .await
            .unwrap();

        let reservation = hold("SOCKS", "s-1", 3);
        let err = store
            .commit(
                WriteBatch::new()
                    .put_reservation(reservation.clone(), Precondition::MustNotExist)
                    .put_stock(stale.doc.hold(3).unwrap(), stale.unchanged()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.get_reservation(&reservation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_active_hold_conflicts() {
        let store = InMemoryStore::new();
        store.upsert_product(ProductInfo::new("SOCKS", "Socks", 12)).await.unwrap();

        store
            .commit(WriteBatch::new().put_reservation(hold("SOCKS", "s-1", 1), Precondition::MustNotExist))
            .await
            .unwrap();
        let err = store
            .commit(WriteBatch::new().put_reservation(hold("SOCKS", "s-1", 1), Precondition::MustNotExist))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_query_expired_orders_and_limits() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for (i, holder) in ["a", "b", "c"].iter().enumerate() {
            let mut r = hold("SOCKS", holder, 1);
            r.expires_at = now - Duration::seconds(10 * (i as i64 + 1));
            store.put_reservation_unchecked(r).await;
        }
        store.put_reservation_unchecked(hold("SOCKS", "d", 1)).await;

        let expired = store.query_expired(now, 2).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert!(expired[0].doc.expires_at <= expired[1].doc.expires_at);
        assert_eq!(expired[0].doc.holder, Holder::Session("c".to_string()));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryStore::new();
        store.inject_conflicts(1);
        assert!(store.commit(WriteBatch::new()).await.is_err());
        assert!(store.commit(WriteBatch::new()).await.is_ok());

        store.set_unavailable(true);
        let err = store.get_stock(&ProductId::new("SOCKS")).await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_restock_keeps_holds() {
        let store = InMemoryStore::new();
        store.upsert_product(ProductInfo::new("SOCKS", "Socks", 5)).await.unwrap();
        let stock = store.get_stock(&ProductId::new("SOCKS")).await.unwrap().unwrap();
        store
            .commit(WriteBatch::new().put_stock(stock.doc.hold(4).unwrap(), stock.unchanged()))
            .await
            .unwrap();

        let restocked = store.upsert_product(ProductInfo::new("SOCKS", "Socks", 9)).await.unwrap();
        assert_eq!((restocked.available_stock, restocked.reserved_stock), (5, 4));
        assert!(store.upsert_product(ProductInfo::new("SOCKS", "Socks", 3)).await.is_err());
    }
}
