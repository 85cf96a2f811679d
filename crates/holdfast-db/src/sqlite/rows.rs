//! Row types and their conversion into documents.

use chrono::{DateTime, SecondsFormat, Utc};
use holdfast_core::{Holder, ProductId, ProductInfo, Reservation, ReservationId, StockAggregate};
use sqlx::FromRow;

use crate::error::{StoreError, StoreResult};
use crate::store::Versioned;

/// Fixed-width RFC 3339, so text comparison in SQL orders by time.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("{}: {}", column, e)))
}

fn decode_version(raw: i64) -> StoreResult<u64> {
    u64::try_from(raw).map_err(|_| StoreError::Serialization(format!("negative version {}", raw)))
}

#[derive(Debug, FromRow)]
pub(crate) struct StockRow {
    pub product_id: String,
    pub total_stock: i64,
    pub available_stock: i64,
    pub reserved_stock: i64,
    pub version: i64,
}

impl TryFrom<StockRow> for Versioned<StockAggregate> {
    type Error = StoreError;

    fn try_from(row: StockRow) -> StoreResult<Self> {
        Ok(Versioned::new(
            StockAggregate {
                product_id: ProductId::new(row.product_id),
                total_stock: row.total_stock,
                available_stock: row.available_stock,
                reserved_stock: row.reserved_stock,
            },
            decode_version(row.version)?,
        ))
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReservationRow {
    pub id: String,
    pub holder_key: String,
    pub product_id: String,
    pub quantity: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
    pub version: i64,
}

impl TryFrom<ReservationRow> for Versioned<Reservation> {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> StoreResult<Self> {
        let id: ReservationId = row
            .id
            .parse()
            .map_err(|e: holdfast_core::ValidationError| StoreError::Serialization(e.to_string()))?;
        let holder = Holder::from_key(&row.holder_key)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let status = row
            .status
            .parse()
            .map_err(|e: holdfast_core::ReservationError| StoreError::Serialization(e.to_string()))?;

        Ok(Versioned::new(
            Reservation {
                id,
                holder,
                product_id: ProductId::new(row.product_id),
                quantity: row.quantity,
                status,
                created_at: decode_timestamp("created_at", &row.created_at)?,
                updated_at: decode_timestamp("updated_at", &row.updated_at)?,
                expires_at: decode_timestamp("expires_at", &row.expires_at)?,
            },
            decode_version(row.version)?,
        ))
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    pub product_id: String,
    pub name: String,
    pub total_stock: i64,
    pub max_order_quantity: i64,
    pub min_order_quantity: i64,
    pub is_active: bool,
}

impl From<ProductRow> for ProductInfo {
    fn from(row: ProductRow) -> Self {
        ProductInfo {
            product_id: ProductId::new(row.product_id),
            name: row.name,
            total_stock: row.total_stock,
            max_order_quantity: row.max_order_quantity,
            min_order_quantity: row.min_order_quantity,
            is_active: row.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_as_text() {
        let early = DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z").unwrap().with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1500);

        let (a, b) = (encode_timestamp(early), encode_timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_timestamp("t", &b).unwrap(), late);
    }

    #[test]
    fn test_bad_row_is_serialization_error() {
        let row = ReservationRow {
            id: "nope".to_string(),
            holder_key: "user:1".to_string(),
            product_id: "P".to_string(),
            quantity: 1,
            status: "active".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
            expires_at: String::new(),
            version: 1,
        };
        let err = Versioned::<Reservation>::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
