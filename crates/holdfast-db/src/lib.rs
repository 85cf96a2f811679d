//! # holdfast-db: Document Store Boundary
//!
//! Storage for stock ledgers and reservations behind one async contract,
//! [`DocumentStore`], plus the read-only [`ProductCatalog`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Holdfast Data Flow                               │
//! │                                                                         │
//! │  ReservationManager / ExpiryReaper (holdfast-engine)                   │
//! │       │  get_* ──► decide ──► commit(WriteBatch)                        │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   holdfast-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌───────────────┐    │   │
//! │  │   │    store      │   │    memory     │   │    sqlite     │    │   │
//! │  │   │ DocumentStore │◄──│ InMemoryStore │   │  SqliteStore  │    │   │
//! │  │   │ WriteBatch    │◄──┼───────────────┼───│  Database     │    │   │
//! │  │   │ Versioned<T>  │   │ tests, dev    │   │  migrations   │    │   │
//! │  │   └───────────────┘   └───────────────┘   └───────────────┘    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - The traits, versioned documents and write batches
//! - [`memory`] - Lock-guarded maps with fault injection
//! - [`sqlite`] - sqlx-backed store; [`pool`] and [`migrations`] support it
//! - [`error`] - [`StoreError`] and its mapping into caller errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use holdfast_db::{DbConfig, SqliteStore};
//!
//! let store = SqliteStore::open(DbConfig::new("holdfast.db")).await?;
//! store.upsert_product(&ProductInfo::new("MUG", "Mug", 40)).await?;
//! let stock = store.get_stock(&ProductId::new("MUG")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sqlite;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use pool::{Database, DbConfig};
pub use sqlite::SqliteStore;
pub use store::{DocumentStore, Precondition, ProductCatalog, Versioned, Write, WriteBatch};
