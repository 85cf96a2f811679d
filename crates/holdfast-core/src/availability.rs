//! # Availability
//!
//! The single computation that decides whether a holder may hold `quantity`
//! units of a product. The read-only availability check and the reserve
//! transaction both run it, so what the cart shows and what a reserve
//! accepts can never disagree.
//!
//! ## Holder-Aware Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total 10, holder A already holds 6                                     │
//! │                                                                         │
//! │  available_stock        = 4                                             │
//! │  available_for_holder   = available_stock + A's own hold                │
//! │                         = 4 + 6 = 10   (for A)                          │
//! │                         = 4 + 0 = 4    (for anyone else)                │
//! │  max_can_reserve        = min(available_for_holder, max_order_quantity) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{ReservationError, ReservationResult, ValidationError};
use crate::ledger::StockAggregate;
use crate::types::{ProductId, ProductInfo};

// =============================================================================
// Result DTOs
// =============================================================================

/// Why a requested quantity cannot be held. Several may be set at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LimitReasons {
    pub exceeds_stock: bool,
    pub exceeds_order_limit: bool,
    pub product_inactive: bool,
    pub below_minimum: bool,
    /// The product or its ledger could not be read; nothing else is known.
    pub lookup_failed: bool,
}

impl LimitReasons {
    pub fn any(&self) -> bool {
        self.exceeds_stock
            || self.exceeds_order_limit
            || self.product_inactive
            || self.below_minimum
            || self.lookup_failed
    }
}

/// Answer to "can this holder hold `requested` units right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockCheckResult {
    #[ts(as = "String")]
    pub product_id: ProductId,
    pub requested: i64,
    pub can_reserve: bool,
    /// Free units in the ledger, ignoring the holder's own hold.
    pub available_stock: i64,
    /// Units the holder already holds on this product.
    pub currently_reserved: i64,
    pub available_for_holder: i64,
    pub max_can_reserve: i64,
    /// Catalog bounds the request was judged against.
    pub min_order_quantity: i64,
    pub max_order_quantity: i64,
    pub limit_reasons: LimitReasons,
}

impl StockCheckResult {
    /// The answer given when the product or ledger could not be read.
    pub fn conservative(product_id: ProductId, requested: i64) -> Self {
        StockCheckResult {
            product_id,
            requested,
            can_reserve: false,
            available_stock: 0,
            currently_reserved: 0,
            available_for_holder: 0,
            max_can_reserve: 0,
            min_order_quantity: 0,
            max_order_quantity: 0,
            limit_reasons: LimitReasons {
                lookup_failed: true,
                ..LimitReasons::default()
            },
        }
    }

    /// Turns the check into the typed error a reserve must fail with.
    ///
    /// Checked in order: inactive, non-positive, below minimum, stock, order
    /// limit. The first that applies wins, so a request past both the stock
    /// and the order limit reports `insufficient-stock`.
    pub fn ensure_reservable(&self) -> ReservationResult<()> {
        let reasons = &self.limit_reasons;

        if reasons.lookup_failed {
            return Err(ReservationError::ProductNotFound(self.product_id.to_string()));
        }
        if reasons.product_inactive {
            return Err(ReservationError::ProductInactive(self.product_id.to_string()));
        }
        if self.requested < 1 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if reasons.below_minimum {
            return Err(ValidationError::BelowMinimum {
                field: "quantity".to_string(),
                min: self.min_order_quantity,
            }
            .into());
        }
        if reasons.exceeds_stock {
            return Err(ReservationError::InsufficientStock {
                product_id: self.product_id.to_string(),
                available: self.available_for_holder,
                requested: self.requested,
            });
        }
        if reasons.exceeds_order_limit {
            return Err(ReservationError::ExceedsOrderLimit {
                product_id: self.product_id.to_string(),
                requested: self.requested,
                max: self.max_order_quantity,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Evaluates a request against the catalog entry, the ledger and the
/// holder's current hold on the product.
pub fn check_availability(
    product: &ProductInfo,
    stock: &StockAggregate,
    currently_reserved: i64,
    requested: i64,
) -> StockCheckResult {
    let available_for_holder = stock.available_stock + currently_reserved;
    let max_can_reserve = available_for_holder.min(product.max_order_quantity).max(0);

    let limit_reasons = LimitReasons {
        exceeds_stock: requested > available_for_holder,
        exceeds_order_limit: requested > product.max_order_quantity,
        product_inactive: !product.is_active,
        below_minimum: requested < product.min_order_quantity,
        lookup_failed: false,
    };

    let can_reserve = requested >= 1
        && requested <= max_can_reserve
        && product.is_active
        && requested >= product.min_order_quantity;

    StockCheckResult {
        product_id: product.product_id.clone(),
        requested,
        can_reserve,
        available_stock: stock.available_stock,
        currently_reserved,
        available_for_holder,
        max_can_reserve,
        min_order_quantity: product.min_order_quantity,
        max_order_quantity: product.max_order_quantity,
        limit_reasons,
    }
}

/// Same computation as [`check_availability`], failing with the typed error
/// a reserve reports.
pub fn evaluate_reserve(
    product: &ProductInfo,
    stock: &StockAggregate,
    currently_reserved: i64,
    requested: i64,
) -> ReservationResult<StockCheckResult> {
    let check = check_availability(product, stock, currently_reserved, requested);
    check.ensure_reservable()?;
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn product(total: i64) -> ProductInfo {
        ProductInfo::new("BEANIE", "Beanie", total)
    }

    #[test]
    fn test_other_holder_sees_only_free_stock() {
        // Holder A holds 6 of 10; B asks for 6.
        let p = product(10);
        let stock = StockAggregate::new("BEANIE", 10).hold(6).unwrap();

        let check = check_availability(&p, &stock, 0, 6);
        assert!(!check.can_reserve);
        assert_eq!(check.max_can_reserve, 4);
        assert!(check.limit_reasons.exceeds_stock);
        assert!(!check.limit_reasons.exceeds_order_limit);
    }

    #[test]
    fn test_holder_own_hold_counts_as_available() {
        let p = product(10);
        let stock = StockAggregate::new("BEANIE", 10).hold(6).unwrap();

        let check = check_availability(&p, &stock, 6, 10);
        assert!(check.can_reserve);
        assert_eq!(check.available_for_holder, 10);
        assert_eq!(check.currently_reserved, 6);
    }

    #[test]
    fn test_order_limit_caps_max() {
        let p = product(10).with_max_order_quantity(3);
        let stock = StockAggregate::new("BEANIE", 10);

        let check = check_availability(&p, &stock, 0, 4);
        assert_eq!(check.max_can_reserve, 3);
        assert!(check.limit_reasons.exceeds_order_limit);
        assert!(!check.limit_reasons.exceeds_stock);

        let err = evaluate_reserve(&p, &stock, 0, 4).unwrap_err();
        assert_eq!(
            err,
            ReservationError::ExceedsOrderLimit {
                product_id: "BEANIE".to_string(),
                requested: 4,
                max: 3,
            }
        );
    }

    #[test]
    fn test_inactive_wins_over_other_reasons() {
        let p = product(2).inactive();
        let stock = StockAggregate::new("BEANIE", 2);

        let err = evaluate_reserve(&p, &stock, 0, 50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProductInactive);
    }

    #[test]
    fn test_below_minimum_is_validation_error() {
        let p = product(10).with_min_order_quantity(2);
        let stock = StockAggregate::new("BEANIE", 10);

        let check = check_availability(&p, &stock, 0, 1);
        assert!(check.limit_reasons.below_minimum);
        assert!(!check.can_reserve);

        let err = evaluate_reserve(&p, &stock, 0, 1).unwrap_err();
        assert_eq!(
            err,
            ReservationError::Validation(ValidationError::BelowMinimum {
                field: "quantity".to_string(),
                min: 2,
            })
        );
    }

    #[test]
    fn test_insufficient_stock_carries_counts() {
        let p = product(10);
        let stock = StockAggregate::new("BEANIE", 10);

        let err = evaluate_reserve(&p, &stock, 0, 11).unwrap_err();
        assert_eq!(
            err,
            ReservationError::InsufficientStock {
                product_id: "BEANIE".to_string(),
                available: 10,
                requested: 11,
            }
        );
    }

    #[test]
    fn test_stock_reported_before_order_limit() {
        // Default catalog entries cap an order at total stock.
        let p = product(10);
        let stock = StockAggregate::new("BEANIE", 10).hold(7).unwrap();

        let check = check_availability(&p, &stock, 0, 11);
        assert!(check.limit_reasons.exceeds_stock);
        assert!(check.limit_reasons.exceeds_order_limit);

        let err = evaluate_reserve(&p, &stock, 0, 11).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn test_conservative_result() {
        let check = StockCheckResult::conservative(ProductId::new("GONE"), 1);
        assert!(!check.can_reserve);
        assert_eq!(check.max_can_reserve, 0);
        assert!(check.limit_reasons.lookup_failed);
        assert!(check.limit_reasons.any());
    }
}
