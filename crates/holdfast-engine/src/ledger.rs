//! # Stock Ledger
//!
//! Reads and adjusts a product's counters on their own, outside any
//! reservation. Reservation transitions stage their ledger change in the
//! same batch as the reservation write instead of calling [`StockLedger::adjust`].
//!
//! ```text
//! adjust(p, -2, +2)
//!   read stock v4 {total 10, available 7, reserved 3}
//!   adjusted        {total 10, available 5, reserved 5}   (pure, core)
//!   commit stock if version == 4 ──► v5
//!   conflict ──► retry from read
//! ```

use std::sync::Arc;

use holdfast_core::{ProductId, ReservationError, ReservationResult, StockAggregate};
use holdfast_db::{DocumentStore, Versioned, WriteBatch};
use tracing::debug;

use crate::retry::{RetryPolicy, TxError};

/// Counter access for one store.
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl StockLedger {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        StockLedger { store, retry }
    }

    /// Point-in-time snapshot of a product's counters.
    pub async fn read(&self, product_id: &ProductId) -> ReservationResult<StockAggregate> {
        let stock = load_stock(self.store.as_ref(), product_id).await?;
        Ok(stock.doc)
    }

    /// Applies both deltas in one optimistic transaction, retried on conflict.
    ///
    /// Fails with a validation error if either counter would go negative, and
    /// with an invariant violation if the deltas do not cancel out.
    pub async fn adjust(
        &self,
        product_id: &ProductId,
        available_delta: i64,
        reserved_delta: i64,
    ) -> ReservationResult<StockAggregate> {
        let store = self.store.as_ref();

        self.retry
            .run("adjust", move |attempt| async move {
                let current = load_stock(store, product_id).await?;
                let next = current.doc.adjusted(available_delta, reserved_delta)?;
                next.check_invariant()?;

                store
                    .commit(WriteBatch::new().put_stock(next.clone(), current.unchanged()))
                    .await?;

                debug!(
                    product_id = %product_id,
                    available_delta,
                    reserved_delta,
                    attempt,
                    "Ledger adjusted"
                );
                Ok::<_, TxError>(next)
            })
            .await
    }
}

/// Reads a stock document, treating a missing one as an unknown product.
pub(crate) async fn load_stock(
    store: &dyn DocumentStore,
    product_id: &ProductId,
) -> Result<Versioned<StockAggregate>, TxError> {
    store
        .get_stock(product_id)
        .await?
        .ok_or_else(|| ReservationError::ProductNotFound(product_id.to_string()).into())
}
