//! # Engine Configuration
//!
//! Settings for hold lifetimes, retries, the expiry sweep and the database.
//!
//! ## Where settings come from
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Override order                                       │
//! │                                                                         │
//! │  1. HOLDFAST_* environment variables (win over everything)             │
//! │     HOLDFAST_TTL_SECS=600                                              │
//! │     HOLDFAST_DB_PATH=/var/lib/holdfast/holdfast.db                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/holdfast/holdfast.toml (Linux)                           │
//! │     ~/Library/Application Support/com.holdfast.holdfast/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     15 minute holds, sweep every 10 minutes                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## holdfast.toml
//! ```toml
//! [reservation]
//! ttl_secs = 900
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 10
//! max_backoff_ms = 200
//!
//! [reaper]
//! enabled = true
//! interval_secs = 600
//! batch_size = 500
//!
//! [database]
//! path = "holdfast.db"
//! max_connections = 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use holdfast_core::DEFAULT_RESERVATION_TTL_SECS;
use holdfast_db::DbConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Reservation Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// How long a hold lives without being renewed (seconds).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

/// Longest accepted hold lifetime: 30 days.
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

fn default_ttl() -> u64 {
    DEFAULT_RESERVATION_TTL_SECS
}

impl Default for ReservationSettings {
    fn default() -> Self {
        ReservationSettings { ttl_secs: default_ttl() }
    }
}

// =============================================================================
// Reaper Settings
// =============================================================================

/// Expiry sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperSettings {
    /// Whether the service runs the sweep at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between sweeps (seconds).
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,

    /// Most expired holds picked up by one sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}
fn default_reaper_interval() -> u64 {
    600
}
fn default_batch_size() -> usize {
    500
}

impl Default for ReaperSettings {
    fn default() -> Self {
        ReaperSettings {
            enabled: true,
            interval_secs: default_reaper_interval(),
            batch_size: default_batch_size(),
        }
    }
}

impl ReaperSettings {
    /// Sweep period, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("holdfast.db")
}
fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldfastConfig {
    #[serde(default)]
    pub reservation: ReservationSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub reaper: ReaperSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl HoldfastConfig {
    /// Builds the effective configuration for a service process.
    ///
    /// Each step overrides the one before it:
    /// 1. Default values
    /// 2. Config file (holdfast.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading holdfast config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Like [`HoldfastConfig::load`], but falls back to built-in defaults
    /// (with a warning) when the file is unreadable or invalid.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load holdfast config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a config file body. Missing sections and keys take defaults.
    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.reservation.ttl_secs == 0 || self.reservation.ttl_secs > MAX_TTL_SECS {
            return Err(EngineError::InvalidConfig(format!(
                "reservation.ttl_secs must be between 1 and {}",
                MAX_TTL_SECS
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be greater than 0".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(EngineError::InvalidConfig(format!(
                "retry.initial_backoff_ms ({}) must not exceed retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        if self.reaper.interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "reaper.interval_secs must be greater than 0".into(),
            ));
        }

        if self.reaper.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "reaper.batch_size must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Overlays `HOLDFAST_*` variables from the process environment.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("HOLDFAST_TTL_SECS") {
            match raw.parse::<u64>() {
                Ok(ttl) => {
                    debug!(ttl_secs = ttl, "Overriding reservation TTL from environment");
                    self.reservation.ttl_secs = ttl;
                }
                Err(_) => warn!(value = %raw, "Ignoring invalid HOLDFAST_TTL_SECS"),
            }
        }

        if let Some(raw) = lookup("HOLDFAST_REAPER_INTERVAL_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => self.reaper.interval_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid HOLDFAST_REAPER_INTERVAL_SECS"),
            }
        }

        if let Some(raw) = lookup("HOLDFAST_REAPER_ENABLED") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.reaper.enabled = true,
                "0" | "false" | "no" | "off" => self.reaper.enabled = false,
                _ => warn!(value = %raw, "Ignoring invalid HOLDFAST_REAPER_ENABLED"),
            }
        }

        if let Some(path) = lookup("HOLDFAST_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("HOLDFAST_MAX_ATTEMPTS") {
            match raw.parse::<u32>() {
                Ok(attempts) => self.retry.max_attempts = attempts,
                Err(_) => warn!(value = %raw, "Ignoring invalid HOLDFAST_MAX_ATTEMPTS"),
            }
        }
    }

    /// Per-user `holdfast.toml` under the platform config directory.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "holdfast", "holdfast")
            .map(|dirs| dirs.config_dir().join("holdfast.toml"))
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// Hold lifetime as a chrono duration, for expiry arithmetic.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    /// Pool settings for [`SqliteStore::open`](holdfast_db::SqliteStore::open).
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}
