//! # Reservation Errors
//!
//! Everything a reserve, cancel or confirm can be refused for.
//!
//! ## Where errors come from
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reservation error layering                          │
//! │                                                                         │
//! │  holdfast-core errors (this file)                                      │
//! │  ├── ReservationError - Business rule violations (typed taxonomy)      │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Serializable discriminant for the cart UI      │
//! │                                                                         │
//! │  holdfast-db errors (separate crate)                                   │
//! │  └── StoreError       - Document store failures (conflict, timeout)    │
//! │                                                                         │
//! │  Flow: ValidationError → ReservationError → ErrorKind → Cart UI        │
//! │        StoreError::Conflict ──(retried)──► TransactionConflict         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers match on [`ReservationError::kind`] rather than parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// Stable, serializable discriminant of a [`ReservationError`].
///
/// Serialized in kebab-case (`"insufficient-stock"`, ...), which is the wire
/// contract with the cart UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum ErrorKind {
    InsufficientStock,
    ExceedsOrderLimit,
    ProductInactive,
    ProductNotFound,
    ReservationNotFound,
    ReservationExpired,
    ValidationError,
    TransactionConflict,
    InvariantViolation,
    StoreUnavailable,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientStock => "insufficient-stock",
            ErrorKind::ExceedsOrderLimit => "exceeds-order-limit",
            ErrorKind::ProductInactive => "product-inactive",
            ErrorKind::ProductNotFound => "product-not-found",
            ErrorKind::ReservationNotFound => "reservation-not-found",
            ErrorKind::ReservationExpired => "reservation-expired",
            ErrorKind::ValidationError => "validation-error",
            ErrorKind::TransactionConflict => "transaction-conflict",
            ErrorKind::InvariantViolation => "invariant-violation",
            ErrorKind::StoreUnavailable => "store-unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reservation Error
// =============================================================================

/// Business errors surfaced by the reservation engine.
///
/// ## User Workflow
/// ```text
/// Add to cart (qty: 6)
///      │
///      ▼
/// reserve(): available for holder = 4
///      │
///      ▼
/// InsufficientStock { available: 4, requested: 6 }
///      │
///      ▼
/// UI shows: "Only 4 left"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// Not enough free stock to cover the requested hold.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Requested quantity is above the product's per-order maximum.
    #[error("Quantity {requested} for {product_id} exceeds the order limit of {max}")]
    ExceedsOrderLimit {
        product_id: String,
        requested: i64,
        max: i64,
    },

    /// Product is no longer sold.
    #[error("Product {0} is not available")]
    ProductInactive(String),

    /// Product is unknown to the catalog or has no stock document.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// No reservation with that id, or no active hold for that holder/product.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(String),

    /// The reservation's TTL has elapsed.
    #[error("Reservation {0} has expired")]
    ReservationExpired(String),

    /// Input or ledger arithmetic failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Optimistic commit kept losing races after every retry.
    #[error("Transaction conflict after {attempts} attempts")]
    TransactionConflict { attempts: u32 },

    /// Stored state contradicts a model invariant (e.g. duplicate active holds).
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The document store could not be reached or failed the request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ReservationError {
    /// Returns the serializable discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            ReservationError::ExceedsOrderLimit { .. } => ErrorKind::ExceedsOrderLimit,
            ReservationError::ProductInactive(_) => ErrorKind::ProductInactive,
            ReservationError::ProductNotFound(_) => ErrorKind::ProductNotFound,
            ReservationError::ReservationNotFound(_) => ErrorKind::ReservationNotFound,
            ReservationError::ReservationExpired(_) => ErrorKind::ReservationExpired,
            ReservationError::Validation(_) => ErrorKind::ValidationError,
            ReservationError::TransactionConflict { .. } => ErrorKind::TransactionConflict,
            ReservationError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            ReservationError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Rejected input, caught before any document is read.
///
/// The ledger raises [`ValidationError::NegativeCounter`] too, when an
/// adjustment would take a stock counter below zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing {field}")]
    Required { field: String },

    #[error("{field} has to be greater than zero")]
    MustBePositive { field: String },

    #[error("{field} outside the allowed range {min}..={max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Below a per-product floor such as `min_order_quantity`.
    #[error("{field} is below the minimum of {min}")]
    BelowMinimum { field: String, min: i64 },

    #[error("{field} longer than {max} bytes")]
    TooLong { field: String, max: usize },

    /// Malformed value, e.g. a reservation id that does not parse as a UUID.
    #[error("malformed {field}: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A holder needs a user id or a session id, never both.
    #[error("need exactly one of {first} and {second}")]
    ExactlyOneOf { first: String, second: String },

    #[error("{counter} would go negative ({current} + {delta})")]
    NegativeCounter {
        counter: String,
        current: i64,
        delta: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with ReservationError.
pub type ReservationResult<T> = Result<T, ReservationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ReservationError::InsufficientStock {
            product_id: "HOODIE-BLK".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for HOODIE-BLK: available 3, requested 5"
        );
    }

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&ErrorKind::InsufficientStock).unwrap();
        assert_eq!(json, "\"insufficient-stock\"");

        let parsed: ErrorKind = serde_json::from_str("\"reservation-expired\"").unwrap();
        assert_eq!(parsed, ErrorKind::ReservationExpired);
        assert_eq!(ErrorKind::TransactionConflict.to_string(), "transaction-conflict");
    }

    #[test]
    fn test_validation_converts_to_reservation_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let err: ReservationError = validation_err.into();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
