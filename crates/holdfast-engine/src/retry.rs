//! # Retry Policy
//!
//! Optimistic transactions lose races. When a commit comes back with
//! [`StoreError::Conflict`] (or the store timed out on a lock), the whole
//! transaction is re-run from its reads after an exponential, jittered pause.
//!
//! ## Attempt Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   attempt 1 ── read ─► decide ─► commit ──► Ok ─────────────► done     │
//! │                                     │                                   │
//! │                                     ├─ Rejected(business error) ► done │
//! │                                     ├─ Store(not retryable) ──► done   │
//! │                                     │        (StoreUnavailable)         │
//! │                                     ▼                                   │
//! │                                 Conflict                                │
//! │                                     │                                   │
//! │           sleep 10ms, 20ms, 40ms ... capped at max_backoff              │
//! │                                     │                                   │
//! │   attempt 2 ── read ─► decide ─► commit ...                             │
//! │                                                                         │
//! │   after max_attempts conflicts ──► TransactionConflict { attempts }    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use holdfast_core::{ReservationError, ReservationResult};
use holdfast_db::StoreError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// Policy
// =============================================================================

/// How many times a transaction is attempted and how long to wait between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause after the first conflict (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single pause (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    10
}
fn default_max_backoff() -> u64 {
    200
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps. Handy in tests that inject conflicts.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.initial_backoff_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: self.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `transaction` until it commits, is rejected, or runs out of attempts.
    ///
    /// The closure is called once per attempt and must redo its reads.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &'static str, mut transaction: F) -> ReservationResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TxError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.create_backoff();
        let mut attempt = 1u32;

        loop {
            match transaction(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Transaction committed after retry");
                    }
                    return Ok(value);
                }
                Err(TxError::Rejected(e)) => return Err(e),
                Err(TxError::Store(e)) if e.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, error = %e, "Giving up after repeated conflicts");
                        return Err(ReservationError::TransactionConflict { attempts: attempt });
                    }

                    let pause = backoff.next_backoff().unwrap_or_else(|| self.max_backoff());
                    warn!(operation, attempt, ?pause, error = %e, "Transaction conflict, retrying");
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    attempt += 1;
                }
                Err(TxError::Store(e)) => return Err(e.into()),
            }
        }
    }
}

// =============================================================================
// Transaction Error
// =============================================================================

/// Outcome of one failed attempt: either the store pushed back, or the
/// business rules said no.
#[derive(Debug)]
pub(crate) enum TxError {
    Store(StoreError),
    Rejected(ReservationError),
}

impl From<StoreError> for TxError {
    fn from(e: StoreError) -> Self {
        TxError::Store(e)
    }
}

impl From<ReservationError> for TxError {
    fn from(e: ReservationError) -> Self {
        TxError::Rejected(e)
    }
}

impl From<holdfast_core::ValidationError> for TxError {
    fn from(e: holdfast_core::ValidationError) -> Self {
        TxError::Rejected(e.into())
    }
}

impl From<TxError> for ReservationError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Store(e) => e.into(),
            TxError::Rejected(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_conflicts_below_limit_are_absorbed() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(TxError::Store(StoreError::conflict("stock/X")))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_conflict() {
        let policy = RetryPolicy::immediate(2);

        let err = policy
            .run("test", |_| async {
                Err::<(), _>(TxError::Store(StoreError::Timeout("database is locked".to_string())))
            })
            .await
            .unwrap_err();

        assert_eq!(err, ReservationError::TransactionConflict { attempts: 2 });
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let calls = AtomicU32::new(0);

        let err = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TxError::Rejected(ReservationError::ProductInactive("X".into()))) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProductInactive);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hard_store_failure_is_unavailable() {
        let err = RetryPolicy::immediate(5)
            .run("test", |_| async {
                Err::<(), _>(TxError::Store(StoreError::ConnectionFailed("gone".into())))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_backs_off() {
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();

        let _ = policy
            .run("test", |_| async { Err::<(), _>(TxError::Store(StoreError::conflict("stock/X"))) })
            .await;

        // Four pauses between five attempts, each at least half the nominal interval.
        assert!(started.elapsed() >= Duration::from_millis(5));
        assert!(started.elapsed() <= Duration::from_millis(4 * 300));
    }
}
