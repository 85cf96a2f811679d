//! # Expiry Reaper
//!
//! Background task that turns elapsed holds back into available stock.
//!
//! ## Sweep Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Expiry Sweep                                  │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │ 1. query_expired(now, batch_size)                             │     │
//! │  │    active holds with expires_at <= now                        │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │ 2. Group by product                                           │     │
//! │  │    TEE-M: [r1, r4]   MUG: [r2]                                │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │ 3. Per product, one transaction (retried on conflict)         │     │
//! │  │    re-read stock + each hold                                  │     │
//! │  │    skip holds renewed, confirmed or cancelled since step 1    │     │
//! │  │    mark the rest expired, release sum(quantity)               │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │ 4. Failures are logged and counted, never raised; the next    │     │
//! │  │    query pages past a failed product's holds                  │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Running a sweep twice over the same instant changes nothing the second
//! time: expired holds are no longer active, so step 1 skips them.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use holdfast_core::{ProductId, ReservationId};
use holdfast_db::{DocumentStore, WriteBatch};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{HoldfastConfig, ReaperSettings};
use crate::ledger::load_stock;
use crate::retry::{RetryPolicy, TxError};

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates returned by the expiry query.
    pub scanned: usize,
    /// Holds moved to `expired`.
    pub expired: usize,
    /// Products whose ledger got units back.
    pub products_released: usize,
    pub units_released: i64,
    /// Products (or the query itself) that could not be processed.
    /// Their holds stay active for the next sweep.
    pub failures: usize,
}

/// Totals across every sweep since the reaper started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReaperStats {
    pub sweeps: u64,
    pub expired: u64,
    pub units_released: i64,
    pub failures: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
}

impl ReaperStats {
    fn record(&mut self, report: &SweepReport, at: DateTime<Utc>) {
        self.sweeps += 1;
        self.expired += report.expired as u64;
        self.units_released += report.units_released;
        self.failures += report.failures as u64;
        self.last_sweep_at = Some(at);
    }
}

// =============================================================================
// Reaper
// =============================================================================

/// Periodic expiry sweep over one store.
pub struct ExpiryReaper {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    settings: ReaperSettings,
    stats: Arc<RwLock<ReaperStats>>,
}

/// Handle for controlling a spawned reaper.
pub struct ExpiryReaperHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<RwLock<ReaperStats>>,
}

impl ExpiryReaperHandle {
    /// Cumulative totals so far.
    pub async fn stats(&self) -> ReaperStats {
        self.stats.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Requests shutdown, waits for the task to finish, and returns the
    /// final totals. A sweep already in progress completes first.
    pub async fn stop(self) -> ReaperStats {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Expiry reaper already stopped");
        }
        if let Err(e) = self.join.await {
            error!(error = %e, "Expiry reaper task failed");
        }
        self.stats.read().await.clone()
    }
}

impl ExpiryReaper {
    pub fn new(store: Arc<dyn DocumentStore>, settings: ReaperSettings) -> Self {
        ExpiryReaper {
            store,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            settings,
            stats: Arc::new(RwLock::new(ReaperStats::default())),
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &HoldfastConfig) -> Self {
        Self::new(store, config.reaper.clone()).with_retry_policy(config.retry.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Starts the periodic sweep on its own task. The first sweep runs
    /// immediately.
    pub fn spawn(self) -> ExpiryReaperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let stats = self.stats.clone();
        let join = tokio::spawn(self.run(shutdown_rx));

        ExpiryReaperHandle {
            shutdown_tx,
            join,
            stats,
        }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            interval_secs = self.settings.interval_secs,
            batch_size = self.settings.batch_size,
            "Expiry reaper starting"
        );

        let mut interval = tokio::time::interval(self.settings.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now();
                    self.sweep_once(now).await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Expiry reaper received shutdown signal");
                    break;
                }
            }
        }

        info!("Expiry reaper stopped");
    }

    /// Runs one sweep as of `now`.
    ///
    /// Up to `batch_size` holds are processed. Holds of a product that
    /// fails stay active and would head every later query, so the sweep
    /// widens its window past them instead of counting them against the
    /// batch.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut seen: HashSet<ReservationId> = HashSet::new();
        let mut stuck = 0usize;
        let mut handled = 0usize;

        while handled < self.settings.batch_size {
            let remaining = self.settings.batch_size - handled;
            let limit = remaining + stuck;

            let candidates = match self.store.query_expired(now, limit).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    error!(error = %e, "Expiry query failed");
                    report.failures += 1;
                    break;
                }
            };
            let exhausted = candidates.len() < limit;

            let fresh: Vec<_> = candidates
                .into_iter()
                .filter(|hold| !seen.contains(&hold.doc.id))
                .take(remaining)
                .collect();
            if fresh.is_empty() {
                break;
            }
            report.scanned += fresh.len();

            let mut by_product: BTreeMap<ProductId, Vec<ReservationId>> = BTreeMap::new();
            for hold in fresh {
                seen.insert(hold.doc.id);
                by_product.entry(hold.doc.product_id).or_default().push(hold.doc.id);
            }

            for (product_id, ids) in &by_product {
                let result = self
                    .retry
                    .run("expire", move |attempt| self.expire_product(product_id, ids, now, attempt))
                    .await;

                match result {
                    Ok((expired, units)) => {
                        handled += ids.len();
                        if expired > 0 {
                            report.expired += expired;
                            report.units_released += units;
                            report.products_released += 1;
                        }
                    }
                    Err(e) => {
                        error!(product_id = %product_id, holds = ids.len(), error = %e, "Failed to expire holds");
                        stuck += ids.len();
                        report.failures += 1;
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        if report.expired > 0 || report.failures > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                units_released = report.units_released,
                failures = report.failures,
                "Expiry sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "Expiry sweep found nothing to release");
        }

        self.stats.write().await.record(&report, now);
        report
    }

    /// Expires the still-eligible holds of one product in a single batch.
    ///
    /// Returns (holds expired, units released).
    async fn expire_product(
        &self,
        product_id: &ProductId,
        ids: &[ReservationId],
        now: DateTime<Utc>,
        attempt: u32,
    ) -> Result<(usize, i64), TxError> {
        let stock = load_stock(self.store.as_ref(), product_id).await?;

        let mut batch = WriteBatch::new();
        let mut expired = 0;
        let mut units = 0;

        for id in ids {
            let Some(current) = self.store.get_reservation(id).await? else {
                continue;
            };
            if !current.doc.is_active() || !current.doc.is_expired_at(now) {
                continue;
            }

            let mut hold = current.doc.clone();
            hold.expire(now)?;
            units += hold.quantity;
            expired += 1;
            batch = batch.put_reservation(hold, current.unchanged());
        }

        if expired == 0 {
            return Ok((0, 0));
        }

        let next_stock = stock.doc.release(units)?;
        self.store
            .commit(batch.put_stock(next_stock, stock.unchanged()))
            .await?;

        debug!(product_id = %product_id, expired, units, attempt, "Expired holds released");
        Ok((expired, units))
    }
}
