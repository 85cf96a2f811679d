//! # Store Error Types
//!
//! Error types for document store operations.
//!
//! ## From SQLite to the caller
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    StoreError origins                                   │
//! │                                                                         │
//! │  sqlx::Error / precondition miss                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Categorized: retryable or not              │
//! │       │                                                                 │
//! │       ├── Conflict / Timeout ──► engine retries with backoff           │
//! │       │                              │                                  │
//! │       │                              ▼ (attempts exhausted)             │
//! │       │                       ReservationError::TransactionConflict    │
//! │       │                                                                 │
//! │       └── anything else ─────► ReservationError::StoreUnavailable      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use holdfast_core::ReservationError;
use thiserror::Error;

/// Document store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A write precondition did not hold.
    ///
    /// ## Typical causes
    /// - Another writer committed the document since it was read
    /// - A create targeted a document that already exists
    /// - SQLite reported a UNIQUE violation (e.g. a second active hold)
    #[error("Write conflict on {document}")]
    Conflict { document: String },

    /// The store did not answer in time (pool exhausted, database busy).
    #[error("Store timed out: {0}")]
    Timeout(String),

    /// The SQLite file or pool could not be opened.
    ///
    /// ## Typical causes
    /// - Database file can't be created or opened
    /// - Pool has been closed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A statement failed for a reason that retrying will not fix.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be turned back into a document.
    #[error("Corrupt document: {0}")]
    Serialization(String),

    /// An embedded schema migration was rejected.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Internal store error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Creates a Conflict error for the given document key.
    pub fn conflict(document: impl Into<String>) -> Self {
        StoreError::Conflict {
            document: document.into(),
        }
    }

    /// True when re-running the whole read-decide-commit cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Timeout(_))
    }
}

/// Convert sqlx errors to StoreError.
///
/// ## sqlx to StoreError
/// ```text
/// sqlx::Error::Database (UNIQUE)   → StoreError::Conflict
/// sqlx::Error::Database (locked)   → StoreError::Timeout
/// sqlx::Error::PoolTimedOut        → StoreError::Timeout
/// sqlx::Error::PoolClosed          → StoreError::ConnectionFailed
/// sqlx::Error::ColumnDecode/Decode → StoreError::Serialization
/// Other                            → StoreError::Internal
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if db_err.is_unique_violation() || msg.contains("UNIQUE constraint failed") {
                    let document = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    StoreError::Conflict { document }
                } else if msg.contains("database is locked") || msg.contains("database is busy") {
                    StoreError::Timeout(msg.to_string())
                } else {
                    StoreError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool exhausted".to_string()),

            sqlx::Error::PoolClosed => StoreError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            }

            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

/// Store failures seen by a caller once retrying is no longer an option.
///
/// A conflict surfacing here has been through a single attempt; the engine's
/// retry loop reports its own attempt count instead.
impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } | StoreError::Timeout(_) => {
                ReservationError::TransactionConflict { attempts: 1 }
            }
            other => ReservationError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_core::ErrorKind;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::conflict("stock/TEE").is_retryable());
        assert!(StoreError::Timeout("busy".to_string()).is_retryable());
        assert!(!StoreError::QueryFailed("syntax".to_string()).is_retryable());
    }

    #[test]
    fn test_conversion_to_reservation_error() {
        let err: ReservationError = StoreError::ConnectionFailed("gone".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let err: ReservationError = StoreError::conflict("stock/TEE").into();
        assert_eq!(err.kind(), ErrorKind::TransactionConflict);
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Timeout(_)));
    }
}
