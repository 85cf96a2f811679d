//! # Stock Ledger Arithmetic
//!
//! Per-product counters and the conservation rule that binds them.
//!
//! ## Conservation Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   total_stock  ==  available_stock  +  reserved_stock                   │
//! │                                                                         │
//! │   reserve 3   :  available -3, reserved +3   (total unchanged)          │
//! │   cancel      :  available +3, reserved -3   (total unchanged)          │
//! │   expire      :  available +n, reserved -n   (total unchanged)          │
//! │   confirm     :  no ledger movement                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation goes through [`StockAggregate::adjusted`], which refuses to
//! produce a negative counter. The ledger never mutates in place; callers
//! write the returned value back inside a transaction.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ReservationError, ReservationResult, ValidationError};
use crate::types::ProductId;

/// Stock counters for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAggregate {
    #[ts(as = "String")]
    pub product_id: ProductId,
    pub total_stock: i64,
    pub available_stock: i64,
    pub reserved_stock: i64,
}

impl StockAggregate {
    /// Fresh ledger: everything available, nothing held.
    pub fn new(product_id: impl Into<ProductId>, total_stock: i64) -> Self {
        StockAggregate {
            product_id: product_id.into(),
            total_stock,
            available_stock: total_stock,
            reserved_stock: 0,
        }
    }

    /// Returns the ledger after applying both deltas, or a validation error
    /// if either counter would go negative.
    pub fn adjusted(&self, available_delta: i64, reserved_delta: i64) -> ReservationResult<Self> {
        let available = self.available_stock + available_delta;
        if available < 0 {
            return Err(ValidationError::NegativeCounter {
                counter: "available_stock".to_string(),
                current: self.available_stock,
                delta: available_delta,
            }
            .into());
        }

        let reserved = self.reserved_stock + reserved_delta;
        if reserved < 0 {
            return Err(ValidationError::NegativeCounter {
                counter: "reserved_stock".to_string(),
                current: self.reserved_stock,
                delta: reserved_delta,
            }
            .into());
        }

        Ok(StockAggregate {
            product_id: self.product_id.clone(),
            total_stock: self.total_stock,
            available_stock: available,
            reserved_stock: reserved,
        })
    }

    /// Moves `quantity` from available to reserved (negative moves it back).
    pub fn hold(&self, quantity: i64) -> ReservationResult<Self> {
        self.adjusted(-quantity, quantity)
    }

    /// Moves `quantity` from reserved back to available.
    pub fn release(&self, quantity: i64) -> ReservationResult<Self> {
        self.adjusted(quantity, -quantity)
    }

    /// Checks `available + reserved == total` and that no counter is negative.
    pub fn check_invariant(&self) -> ReservationResult<()> {
        if self.available_stock < 0 || self.reserved_stock < 0 || self.total_stock < 0 {
            return Err(ReservationError::InvariantViolation(format!(
                "negative counter on {}: total {}, available {}, reserved {}",
                self.product_id, self.total_stock, self.available_stock, self.reserved_stock
            )));
        }
        if self.available_stock + self.reserved_stock != self.total_stock {
            return Err(ReservationError::InvariantViolation(format!(
                "ledger out of balance on {}: available {} + reserved {} != total {}",
                self.product_id, self.available_stock, self.reserved_stock, self.total_stock
            )));
        }
        Ok(())
    }
}
