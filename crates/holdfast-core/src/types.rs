//! # Domain Types
//!
//! Identifiers and catalog view shared by every layer.
//!
//! ## Identity Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Identities                                      │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   ProductId     │   │  ReservationId  │   │       Holder        │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  catalog key    │   │  UUID v4        │   │  User(id)           │   │
//! │  │  (opaque str)   │   │  assigned on    │   │  Session(id)        │   │
//! │  │                 │   │  first reserve  │   │  key "user:<id>"    │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// Product Id
// =============================================================================

/// Catalog identifier of a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Wraps a catalog key.
    pub fn new(id: impl Into<String>) -> Self {
        ProductId(id.into())
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        ProductId(value)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        ProductId(value.to_string())
    }
}

// =============================================================================
// Reservation Id
// =============================================================================

/// Opaque reservation identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        ReservationId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        ReservationId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for ReservationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(ReservationId)
            .map_err(|e| ValidationError::InvalidFormat {
                field: "reservation_id".to_string(),
                reason: e.to_string(),
            })
    }
}

// =============================================================================
// Holder
// =============================================================================

/// Whoever owns a hold: a signed-in user or an anonymous cart session.
///
/// The engine treats both as opaque, interchangeable keys; the variant only
/// keeps a user id from colliding with a session id of the same spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
#[ts(export)]
pub enum Holder {
    User(String),
    Session(String),
}

impl Holder {
    /// Builds a holder from the pair of optional ids a request carries.
    ///
    /// Exactly one of the two must be present and non-blank.
    pub fn from_parts(
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let user = user_id.map(str::trim).filter(|s| !s.is_empty());
        let session = session_id.map(str::trim).filter(|s| !s.is_empty());

        match (user, session) {
            (Some(user), None) => Ok(Holder::User(user.to_string())),
            (None, Some(session)) => Ok(Holder::Session(session.to_string())),
            _ => Err(ValidationError::ExactlyOneOf {
                first: "user_id".to_string(),
                second: "session_id".to_string(),
            }),
        }
    }

    /// Storage key: `user:<id>` or `session:<id>`.
    pub fn key(&self) -> String {
        match self {
            Holder::User(id) => format!("user:{}", id),
            Holder::Session(id) => format!("session:{}", id),
        }
    }

    /// Parses a storage key back into a holder.
    pub fn from_key(key: &str) -> Result<Self, ValidationError> {
        match key.split_once(':') {
            Some(("user", id)) if !id.is_empty() => Ok(Holder::User(id.to_string())),
            Some(("session", id)) if !id.is_empty() => Ok(Holder::Session(id.to_string())),
            _ => Err(ValidationError::Required {
                field: "holder".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

// =============================================================================
// Product Info (catalog view)
// =============================================================================

/// Read-only catalog facts the engine needs about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductInfo {
    #[ts(as = "String")]
    pub product_id: ProductId,

    /// Display name (diagnostics only).
    pub name: String,

    /// Units owned, held or not.
    pub total_stock: i64,

    /// Largest quantity a single holder may hold.
    pub max_order_quantity: i64,

    /// Smallest quantity a single holder may hold.
    pub min_order_quantity: i64,

    /// Whether the product is currently sold.
    pub is_active: bool,
}

impl ProductInfo {
    /// Creates an active product with an order limit equal to its stock.
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, total_stock: i64) -> Self {
        ProductInfo {
            product_id: product_id.into(),
            name: name.into(),
            total_stock,
            max_order_quantity: total_stock,
            min_order_quantity: 1,
            is_active: true,
        }
    }

    pub fn with_max_order_quantity(mut self, max: i64) -> Self {
        self.max_order_quantity = max;
        self
    }

    pub fn with_min_order_quantity(mut self, min: i64) -> Self {
        self.min_order_quantity = min;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
