//! # holdfast-core: Pure Reservation Logic
//!
//! Everything that decides *whether* stock may be held lives here, as pure
//! functions over plain values. Reading and writing documents is the job of
//! `holdfast-db`; sequencing reads, decisions and commits is the job of
//! `holdfast-engine`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Holdfast Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          holdfast-engine (ReservationManager, Reaper)           │   │
//! │  │      read docs ──► decide (core) ──► commit WriteBatch          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ holdfast-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌──────────────┐     │   │
//! │  │  │  types   │ │  ledger  │ │reservation │ │ availability │     │   │
//! │  │  │ Holder   │ │  Stock   │ │  status    │ │ StockCheck   │     │   │
//! │  │  │ ids      │ │Aggregate │ │  machine   │ │ LimitReasons │     │   │
//! │  │  └──────────┘ └──────────┘ └────────────┘ └──────────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO CLOCK READS • PURE FUNCTIONS          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            holdfast-db (DocumentStore, SQLite)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Product and reservation ids, [`Holder`], catalog view
//! - [`ledger`] - [`StockAggregate`] counters and the conservation invariant
//! - [`reservation`] - [`Reservation`] and its status transitions
//! - [`availability`] - The holder-aware availability computation
//! - [`confirmation`] - Per-id checkout confirmation report
//! - [`error`] - Typed error taxonomy and its serializable [`ErrorKind`]
//! - [`validation`] - Input checks run before touching the store
//!
//! ## Example Usage
//!
//! ```rust
//! use holdfast_core::{check_availability, ProductInfo, StockAggregate};
//!
//! let product = ProductInfo::new("TOTE-BAG", "Canvas tote", 10);
//! let stock = StockAggregate::new("TOTE-BAG", 10).hold(6).unwrap();
//!
//! // Someone else holds 6, so a new holder can take at most 4.
//! let check = check_availability(&product, &stock, 0, 6);
//! assert!(!check.can_reserve);
//! assert_eq!(check.max_can_reserve, 4);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod confirmation;
pub mod error;
pub mod ledger;
pub mod reservation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use availability::{check_availability, evaluate_reserve, LimitReasons, StockCheckResult};
pub use confirmation::{ConfirmationError, ConfirmationReport};
pub use error::{ErrorKind, ReservationError, ReservationResult, ValidationError};
pub use ledger::StockAggregate;
pub use reservation::{Reservation, ReservationStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default hold lifetime: 15 minutes.
pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 900;

/// Longest catalog key accepted as a document id.
pub const MAX_PRODUCT_ID_LEN: usize = 64;
