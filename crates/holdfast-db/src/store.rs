//! # Document Store Contract
//!
//! The storage capability the engine is written against. Both
//! [`InMemoryStore`](crate::InMemoryStore) and
//! [`SqliteStore`](crate::SqliteStore) implement it.
//!
//! ## Optimistic Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   read stock v7, reservation v2                                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   decide (pure, holdfast-core)                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   WriteBatch                                                            │
//! │     put stock        if version == 7   ──► v8                           │
//! │     put reservation  if version == 2   ──► v3                           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   commit: every precondition holds?                                     │
//! │        ├── yes ──► all writes applied                                   │
//! │        └── no  ──► nothing applied, StoreError::Conflict                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writers of the same product always write its stock document, so the
//! stock version serializes them, including two creates by the same holder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holdfast_core::{Holder, ProductId, ProductInfo, Reservation, ReservationId, StockAggregate};

use crate::error::StoreResult;

// =============================================================================
// Versioned Documents
// =============================================================================

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub doc: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(doc: T, version: u64) -> Self {
        Versioned { doc, version }
    }

    /// Precondition that the document is still at the version it was read at.
    pub fn unchanged(&self) -> Precondition {
        Precondition::Version(self.version)
    }
}

/// Condition a write must satisfy for the batch to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not exist yet. It is created at version 1.
    MustNotExist,
    /// The document must be at exactly this version. It moves to version + 1.
    Version(u64),
}

impl Precondition {
    /// Version the document holds after the write commits.
    pub fn next_version(&self) -> u64 {
        match self {
            Precondition::MustNotExist => 1,
            Precondition::Version(v) => v + 1,
        }
    }
}

// =============================================================================
// Write Batch
// =============================================================================

/// One document write inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Stock {
        doc: StockAggregate,
        precondition: Precondition,
    },
    Reservation {
        doc: Reservation,
        precondition: Precondition,
    },
}

impl Write {
    /// Key used in conflict reports and logs.
    pub fn document_key(&self) -> String {
        match self {
            Write::Stock { doc, .. } => format!("stock/{}", doc.product_id),
            Write::Reservation { doc, .. } => format!("reservation/{}", doc.id),
        }
    }
}

/// Writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    pub fn put_stock(mut self, doc: StockAggregate, precondition: Precondition) -> Self {
        self.writes.push(Write::Stock { doc, precondition });
        self
    }

    pub fn put_reservation(mut self, doc: Reservation, precondition: Precondition) -> Self {
        self.writes.push(Write::Reservation { doc, precondition });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Versioned storage of stock ledgers and reservations.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a product's ledger.
    async fn get_stock(&self, product_id: &ProductId) -> StoreResult<Option<Versioned<StockAggregate>>>;

    /// Reads one reservation by id, whatever its status.
    async fn get_reservation(&self, id: &ReservationId) -> StoreResult<Option<Versioned<Reservation>>>;

    /// Active reservations of `holder` on `product_id`.
    ///
    /// At most one is expected; returning every match lets the caller detect
    /// a broken invariant instead of silently picking one.
    async fn find_active_reservations(
        &self,
        holder: &Holder,
        product_id: &ProductId,
    ) -> StoreResult<Vec<Versioned<Reservation>>>;

    /// Every active reservation of `holder`, oldest first.
    async fn find_holder_reservations(&self, holder: &Holder) -> StoreResult<Vec<Versioned<Reservation>>>;

    /// Up to `limit` active reservations with `expires_at <= now`, soonest first.
    async fn query_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Versioned<Reservation>>>;

    /// Applies every write in the batch, or none of them.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) if any
    /// precondition does not hold.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}

/// Read-only view of the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: &ProductId) -> StoreResult<Option<ProductInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version() {
        assert_eq!(Precondition::MustNotExist.next_version(), 1);
        assert_eq!(Precondition::Version(7).next_version(), 8);
    }

    #[test]
    fn test_batch_builder() {
        let stock = StockAggregate::new("SCARF", 5);
        let versioned = Versioned::new(stock.clone(), 3);
        let batch = WriteBatch::new().put_stock(stock, versioned.unchanged());

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.writes()[0].document_key(), "stock/SCARF");
        assert!(!WriteBatch::new().put_stock(StockAggregate::new("X", 1), Precondition::MustNotExist).is_empty());
    }
}
