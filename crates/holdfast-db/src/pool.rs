//! # SQLite Connection Handling
//!
//! [`DbConfig`] says where the reservation database lives and how many
//! connections may touch it. [`Database`] turns that into a live `SqlitePool`
//! with the schema applied, ready for [`crate::SqliteStore`].
//!
//! ```text
//!   DbConfig ──► connect_options() ──┐
//!      │                             ├──► SqlitePool ──► migrate ──► Database
//!      └──────► pool_options() ──────┘
//! ```
//!
//! ## Locking
//! A file database runs in WAL mode: the reaper scanning for expired holds
//! never blocks a shopper's reserve. Commits still take the single writer
//! lock. A commit that cannot get it within `busy_timeout` fails with
//! `StoreError::Timeout`, which the engine retries like a version conflict.
//!
//! ## In-memory databases
//! `:memory:` gives every connection a private database, so the pool is
//! held at exactly one connection and that connection is never recycled.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migrations;

const MEMORY_MARKER: &str = ":memory:";

// =============================================================================
// DbConfig
// =============================================================================

/// Where the reservation database lives and how the pool around it behaves.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/holdfast/holdfast.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Upper bound on pooled connections (5).
    pub max_connections: u32,
    /// Connections opened eagerly and kept warm (1).
    pub min_connections: u32,
    /// Wait for a pooled connection before `StoreError::Timeout` (30s).
    pub connect_timeout: Duration,
    /// Wait on SQLite's writer lock before giving up (5s).
    pub busy_timeout: Duration,
    /// Idle connections beyond `min_connections` are closed after this (10m).
    pub idle_timeout: Duration,
    /// Apply embedded migrations when the pool opens.
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed database at `path`, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),
            run_migrations: true,
        }
    }

    /// Private single-connection database that vanishes with the pool.
    pub fn in_memory() -> Self {
        Self {
            database_path: PathBuf::from(MEMORY_MARKER),
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            ..Self::new(MEMORY_MARKER)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Skip migrations, for tooling that inspects an existing file as-is.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_MARKER
    }

    fn connect_options(&self) -> StoreResult<SqliteConnectOptions> {
        let parsed = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
        } else {
            SqliteConnectOptions::from_str(&format!(
                "sqlite://{}?mode=rwc",
                self.database_path.display()
            ))
            .map(|opts| opts.create_if_missing(true).journal_mode(SqliteJournalMode::Wal))
        };
        let options = parsed.map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        // Stock rows reference products; the schema relies on enforced keys.
        Ok(options
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout);

        if self.is_in_memory() {
            options.idle_timeout(None).max_lifetime(None)
        } else {
            options.idle_timeout(self.idle_timeout)
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// A migrated SQLite pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool described by `config` and brings the schema up to date
    /// unless `run_migrations` is off.
    pub async fn new(config: DbConfig) -> StoreResult<Self> {
        let target = config.database_path.display().to_string();
        info!(path = %target, in_memory = config.is_in_memory(), "Opening reservation database");

        let connect = config.connect_options()?;
        debug!(busy_timeout_ms = config.busy_timeout.as_millis() as u64, "SQLite options ready");

        let pool = config
            .pool_options()
            .connect_with(connect)
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("{}: {}", target, e)))?;

        let db = Self { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }

        info!(path = %target, max_connections = config.max_connections, "Reservation database ready");
        Ok(db)
    }

    /// Applies any embedded migrations this file has not seen yet.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for checked-out connections to return, then closes them all.
    pub async fn close(&self) {
        debug!("Closing reservation database pool");
        self.pool.close().await;
    }

    /// True when a trivial query round-trips.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|one| one == 1)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_database_opens_fully_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (embedded, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert!(embedded > 0);
        assert_eq!(embedded, applied);
    }

    #[tokio::test]
    async fn migrations_can_be_deferred() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false)).await.unwrap();
        let (_, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(applied, 0);

        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
        let (embedded, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(embedded, applied);
    }

    #[test]
    fn builder_overrides_file_defaults() {
        let config = DbConfig::new("/tmp/holdfast-pool.db")
            .max_connections(8)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.is_in_memory());
    }

    #[test]
    fn memory_config_is_pinned_to_one_connection() {
        let config = DbConfig::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 1);
        assert!(config.run_migrations);
    }
}
