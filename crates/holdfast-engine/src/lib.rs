//! # holdfast-engine: Reservation Runtime
//!
//! Turns the pure decisions of `holdfast-core` into transactions against a
//! `holdfast-db` document store, and keeps expired holds from pinning stock.
//!
//! ## Module Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         holdfast-engine                                 │
//! │                                                                         │
//! │  ┌────────────────────┐   ┌────────────────┐   ┌────────────────────┐  │
//! │  │ ReservationManager │   │  StockLedger   │   │   ExpiryReaper     │  │
//! │  │  check_availability│   │  read          │   │   sweep_once       │  │
//! │  │  reserve / cancel  │   │  adjust        │   │   spawn ─► Handle  │  │
//! │  │  confirm_reserv..  │   │                │   │   stop / stats     │  │
//! │  └─────────┬──────────┘   └───────┬────────┘   └─────────┬──────────┘  │
//! │            │                      │                      │             │
//! │            └──────────────────────┼──────────────────────┘             │
//! │                                   ▼                                     │
//! │                ┌─────────────────────────────────────┐                 │
//! │                │ RetryPolicy: re-run on Conflict     │                 │
//! │                │ Clock: now() for TTL and expiry     │                 │
//! │                └─────────────────────────────────────┘                 │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                  DocumentStore + ProductCatalog (db)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use holdfast_core::{Holder, ProductId, ProductInfo};
//! use holdfast_db::InMemoryStore;
//! use holdfast_engine::ReservationManager;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! store.upsert_product(ProductInfo::new("TOTE", "Canvas Tote", 10)).await?;
//!
//! let manager = ReservationManager::new(store.clone(), store.clone());
//! let holder = Holder::Session("cart-42".to_string());
//! let id = manager.reserve(&ProductId::new("TOTE"), 2, &holder).await?;
//!
//! let report = manager.confirm_reservations(&[id]).await;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod reaper;
pub mod retry;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DatabaseSettings, HoldfastConfig, ReaperSettings, ReservationSettings};
pub use error::{EngineError, EngineResult};
pub use ledger::StockLedger;
pub use manager::ReservationManager;
pub use reaper::{ExpiryReaper, ExpiryReaperHandle, ReaperStats, SweepReport};
pub use retry::RetryPolicy;
