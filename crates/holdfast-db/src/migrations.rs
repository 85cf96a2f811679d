//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied in filename order the first time a pool opens a database that
//! has not seen them. sqlx tracks what ran in its `_sqlx_migrations` table.
//!
//! | File | Creates |
//! |---|---|
//! | `001_initial_schema.sql` | `products`, `stock` (balance CHECK), `reservations` (one active hold per holder and product) |
//!
//! Schema changes go in a new `NNN_what_changed.sql`. Applied files are
//! checksummed, so editing one breaks every database that already ran it.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::StoreResult;

static EMBEDDED: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Brings `pool`'s database up to the newest embedded schema.
/// A database that is already current is left untouched.
pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    let embedded = EMBEDDED.migrations.len();
    debug!(embedded, "Applying embedded schema migrations");

    EMBEDDED.run(pool).await?;

    info!(embedded, "Reservation schema is current");
    Ok(())
}

/// `(embedded, applied)` migration counts. A database that was never
/// migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> StoreResult<(usize, usize)> {
    let applied = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .map_or(0, |n| n.max(0) as usize);

    Ok((EMBEDDED.migrations.len(), applied))
}
