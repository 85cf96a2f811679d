//! # Validation Module
//!
//! Input checks run before any store access.
//!
//! ```text
//! caller input ──► validation (this module) ──► availability ──► commit
//!                  rejects malformed input      rejects what the ledger
//!                  without a round-trip         or catalog cannot allow
//! ```

use crate::error::ValidationError;
use crate::types::{Holder, ProductId};
use crate::MAX_PRODUCT_ID_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a requested hold quantity.
///
/// ## Example
/// ```rust
/// use holdfast_core::validation::validate_quantity;
///
/// assert!(validate_quantity(3).is_ok());
/// assert!(validate_quantity(0).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a catalog key before it is used as a document id.
pub fn validate_product_id(product_id: &ProductId) -> ValidationResult<()> {
    let id = product_id.as_str();

    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }

    if id.len() > MAX_PRODUCT_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "product_id".to_string(),
            max: MAX_PRODUCT_ID_LEN,
        });
    }

    if id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "product_id".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a holder before its key is written into a reservation.
///
/// A blank id would be stored as a bare `user:` key that no read can parse
/// back, so it is refused here along with control characters.
pub fn validate_holder(holder: &Holder) -> ValidationResult<()> {
    let (field, id) = match holder {
        Holder::User(id) => ("user_id", id),
        Holder::Session(id) => ("session_id", id),
    };

    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates catalog facts supplied when seeding or restocking a product.
pub fn validate_stock_levels(
    total_stock: i64,
    min_order_quantity: i64,
    max_order_quantity: i64,
) -> ValidationResult<()> {
    if total_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "total_stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    if min_order_quantity < 1 {
        return Err(ValidationError::MustBePositive {
            field: "min_order_quantity".to_string(),
        });
    }

    if max_order_quantity < min_order_quantity {
        return Err(ValidationError::BelowMinimum {
            field: "max_order_quantity".to_string(),
            min: min_order_quantity,
        });
    }

    Ok(())
}
