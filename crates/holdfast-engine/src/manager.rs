//! # Reservation Manager
//!
//! The caller-facing operations: check, reserve, cancel and confirm.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         reserve(p, 5, holder)                           │
//! │                                                                         │
//! │  validate input    ──✗──► ValidationError (no store round-trip)        │
//! │        │                                                                │
//! │        ▼                        ┌──────────── retry on Conflict ─────┐  │
//! │  ┌──────────────────────────────┴──────────────────────────────────┐ │  │
//! │  │ read   catalog entry, stock vN, holder's active hold vM (or none)│ │  │
//! │  │ decide evaluate_reserve(product, stock, held, 5)                 │ │  │
//! │  │ stage  hold exists ─► resize to 5, renew TTL, ledger moves Δ     │ │  │
//! │  │        no hold     ─► open hold of 5, ledger moves 5             │ │  │
//! │  │ commit stock if vN, hold if vM (or must not exist) ──────────────┼─┘  │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ReservationId                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every transition that moves stock writes the stock document and the
//! reservation in one [`WriteBatch`], so the ledger and the holds can never
//! drift apart.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Duration;
use holdfast_core::validation::{validate_holder, validate_product_id, validate_quantity};
use holdfast_core::{
    check_availability, evaluate_reserve, ConfirmationReport, Holder, ProductId, ProductInfo,
    Reservation, ReservationError, ReservationId, ReservationResult, ReservationStatus,
    StockAggregate, StockCheckResult,
};
use holdfast_db::{DocumentStore, Precondition, ProductCatalog, Versioned, WriteBatch};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::HoldfastConfig;
use crate::ledger::{load_stock, StockLedger};
use crate::retry::{RetryPolicy, TxError};

/// Entry point for every reservation operation.
///
/// Cheap to clone; clones share the same store, catalog and clock.
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<dyn ProductCatalog>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl ReservationManager {
    /// Creates a manager with the default 15 minute TTL and retry policy.
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<dyn ProductCatalog>) -> Self {
        ReservationManager {
            store,
            catalog,
            clock: Arc::new(SystemClock),
            ttl: HoldfastConfig::default().ttl(),
            retry: RetryPolicy::default(),
        }
    }

    /// Creates a manager with the TTL and retry policy from `config`.
    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<dyn ProductCatalog>,
        config: &HoldfastConfig,
    ) -> Self {
        Self::new(store, catalog)
            .with_ttl(config.ttl())
            .with_retry_policy(config.retry.clone())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Ledger access over the same store and retry policy.
    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(self.store.clone(), self.retry.clone())
    }

    // =========================================================================
    // Availability
    // =========================================================================

    /// Can `holder` hold `quantity` units of `product_id` right now?
    ///
    /// Read-only. Any failure to look things up (unknown product, store
    /// error, corrupt holds) yields a result that forbids the reservation
    /// instead of an error.
    pub async fn check_availability(
        &self,
        product_id: &ProductId,
        quantity: i64,
        holder: &Holder,
    ) -> StockCheckResult {
        match self.try_check(product_id, quantity, holder).await {
            Ok(check) => check,
            Err(e) => {
                let e = ReservationError::from(e);
                warn!(
                    product_id = %product_id,
                    holder = %holder,
                    quantity,
                    error = %e,
                    "Availability lookup failed, reporting nothing reservable"
                );
                StockCheckResult::conservative(product_id.clone(), quantity)
            }
        }
    }

    async fn try_check(
        &self,
        product_id: &ProductId,
        quantity: i64,
        holder: &Holder,
    ) -> Result<StockCheckResult, TxError> {
        validate_holder(holder)?;
        let product = self.load_product(product_id).await?;
        let stock = load_stock(self.store.as_ref(), product_id).await?;
        let held = self.active_hold(holder, product_id).await?.map_or(0, |r| r.doc.quantity);

        Ok(check_availability(&product, &stock.doc, held, quantity))
    }

    // =========================================================================
    // Reserve
    // =========================================================================

    /// Places or resizes `holder`'s hold on `product_id` to `quantity` units.
    ///
    /// A holder has at most one active hold per product. Reserving again
    /// replaces its quantity, moves the ledger by the difference, and renews
    /// the TTL even when the quantity is unchanged.
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: i64,
        holder: &Holder,
    ) -> ReservationResult<ReservationId> {
        validate_quantity(quantity)?;
        validate_product_id(product_id)?;
        validate_holder(holder)?;

        self.retry
            .run("reserve", move |attempt| {
                self.try_reserve(product_id, quantity, holder, attempt)
            })
            .await
    }

    async fn try_reserve(
        &self,
        product_id: &ProductId,
        quantity: i64,
        holder: &Holder,
        attempt: u32,
    ) -> Result<ReservationId, TxError> {
        let now = self.clock.now();

        let product = self.load_product(product_id).await?;
        let stock = load_stock(self.store.as_ref(), product_id).await?;
        let existing = self.active_hold(holder, product_id).await?;
        let held = existing.as_ref().map_or(0, |r| r.doc.quantity);

        evaluate_reserve(&product, &stock.doc, held, quantity)?;

        let (reservation, precondition, delta) = match existing {
            Some(current) => {
                let mut reservation = current.doc.clone();
                let delta = reservation.resize(quantity, now, self.ttl)?;
                (reservation, current.unchanged(), delta)
            }
            None => (
                Reservation::open(holder.clone(), product_id.clone(), quantity, now, self.ttl),
                Precondition::MustNotExist,
                quantity,
            ),
        };

        let next_stock = stock.doc.hold(delta)?;
        let id = reservation.id;

        self.store
            .commit(
                WriteBatch::new()
                    .put_stock(next_stock, stock.unchanged())
                    .put_reservation(reservation, precondition),
            )
            .await?;

        debug!(
            product_id = %product_id,
            holder = %holder,
            reservation_id = %id,
            quantity,
            delta,
            attempt,
            "Reservation held"
        );
        Ok(id)
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancels `holder`'s active hold on `product_id` and returns its units.
    pub async fn cancel(&self, product_id: &ProductId, holder: &Holder) -> ReservationResult<()> {
        validate_holder(holder)?;

        self.retry
            .run("cancel", move |attempt| self.try_cancel(product_id, holder, attempt))
            .await
    }

    async fn try_cancel(&self, product_id: &ProductId, holder: &Holder, attempt: u32) -> Result<(), TxError> {
        let now = self.clock.now();

        let current = self.active_hold(holder, product_id).await?.ok_or_else(|| {
            ReservationError::ReservationNotFound(format!("no active hold by {} on {}", holder, product_id))
        })?;
        let stock = load_stock(self.store.as_ref(), product_id).await?;

        let mut reservation = current.doc.clone();
        reservation.cancel(now)?;
        let next_stock = stock.doc.release(reservation.quantity)?;
        let (id, quantity) = (reservation.id, reservation.quantity);

        self.store
            .commit(
                WriteBatch::new()
                    .put_stock(next_stock, stock.unchanged())
                    .put_reservation(reservation, current.unchanged()),
            )
            .await?;

        debug!(
            product_id = %product_id,
            holder = %holder,
            reservation_id = %id,
            quantity,
            attempt,
            "Reservation cancelled"
        );
        Ok(())
    }

    // =========================================================================
    // Confirm
    // =========================================================================

    /// Confirms each id independently.
    ///
    /// One failing id never blocks the others. Repeated ids are handled once,
    /// and an id that is already confirmed is reported as confirmed again.
    /// The ledger is not touched: confirmed units stay counted as reserved.
    pub async fn confirm_reservations(&self, ids: &[ReservationId]) -> ConfirmationReport {
        let mut report = ConfirmationReport::default();
        let mut seen = HashSet::new();

        for id in ids.iter().copied() {
            if !seen.insert(id) {
                continue;
            }

            match self.retry.run("confirm", move |attempt| self.try_confirm(id, attempt)).await {
                Ok(()) => report.record_confirmed(id),
                Err(e) => {
                    debug!(reservation_id = %id, error = %e, "Reservation not confirmed");
                    report.record_failed(id, &e);
                }
            }
        }

        if !report.is_complete() {
            info!(
                confirmed = report.confirmed_ids.len(),
                failed = report.errors.len(),
                "Confirmation batch partially failed"
            );
        }
        report
    }

    async fn try_confirm(&self, id: ReservationId, attempt: u32) -> Result<(), TxError> {
        let now = self.clock.now();

        let current = self
            .store
            .get_reservation(&id)
            .await?
            .ok_or_else(|| ReservationError::ReservationNotFound(id.to_string()))?;

        match current.doc.status {
            ReservationStatus::Confirmed => return Ok(()),
            ReservationStatus::Cancelled => {
                return Err(ReservationError::ReservationNotFound(id.to_string()).into())
            }
            ReservationStatus::Expired => {
                return Err(ReservationError::ReservationExpired(id.to_string()).into())
            }
            ReservationStatus::Active if current.doc.is_expired_at(now) => {
                return Err(ReservationError::ReservationExpired(id.to_string()).into())
            }
            ReservationStatus::Active => {}
        }

        let mut reservation = current.doc.clone();
        reservation.confirm(now)?;

        self.store
            .commit(WriteBatch::new().put_reservation(reservation, current.unchanged()))
            .await?;

        debug!(reservation_id = %id, attempt, "Reservation confirmed");
        Ok(())
    }

    // =========================================================================
    // Holder Views
    // =========================================================================

    /// The holder's active holds, oldest first.
    pub async fn holder_reservations(&self, holder: &Holder) -> ReservationResult<Vec<Reservation>> {
        validate_holder(holder)?;
        let holds = self.store.find_holder_reservations(holder).await?;
        Ok(holds.into_iter().map(|r| r.doc).collect())
    }

    /// Current counters for a product.
    pub async fn stock_level(&self, product_id: &ProductId) -> ReservationResult<StockAggregate> {
        self.ledger().read(product_id).await
    }

    /// Cancels every active hold of `holder`, one product per transaction.
    ///
    /// Returns how many holds were released. A hold that disappears between
    /// listing and cancelling (expired, confirmed) is skipped.
    pub async fn release_holder(&self, holder: &Holder) -> ReservationResult<usize> {
        validate_holder(holder)?;
        let holds = self.store.find_holder_reservations(holder).await?;
        let products: BTreeSet<ProductId> = holds.into_iter().map(|r| r.doc.product_id).collect();

        let mut released = 0;
        for product_id in &products {
            match self.cancel(product_id, holder).await {
                Ok(()) => released += 1,
                Err(ReservationError::ReservationNotFound(_)) => {
                    debug!(product_id = %product_id, holder = %holder, "Hold already gone");
                }
                Err(e) => return Err(e),
            }
        }

        if released > 0 {
            info!(holder = %holder, released, "Released holder's reservations");
        }
        Ok(released)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    async fn load_product(&self, product_id: &ProductId) -> Result<ProductInfo, TxError> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| ReservationError::ProductNotFound(product_id.to_string()).into())
    }

    /// The holder's single active hold on a product.
    ///
    /// More than one is a corrupted store; it is reported, never repaired here.
    async fn active_hold(
        &self,
        holder: &Holder,
        product_id: &ProductId,
    ) -> Result<Option<Versioned<Reservation>>, TxError> {
        let mut holds = self.store.find_active_reservations(holder, product_id).await?;

        if holds.len() > 1 {
            error!(
                product_id = %product_id,
                holder = %holder,
                count = holds.len(),
                "Multiple active reservations for one holder and product"
            );
            return Err(ReservationError::InvariantViolation(format!(
                "{} has {} active holds on {}",
                holder,
                holds.len(),
                product_id
            ))
            .into());
        }

        Ok(holds.pop())
    }
}

impl std::fmt::Debug for ReservationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationManager")
            .field("clock", &self.clock)
            .field("ttl", &self.ttl)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
