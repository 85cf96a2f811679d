//! # Engine Error Types
//!
//! Failures while configuring or bootstrapping the engine. Caller-facing
//! operations return [`holdfast_core::ReservationError`] instead.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Config I/O    │  │       Bootstrap         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Io             │  │  Store (open, migrate)  │ │
//! │  │                 │  │  TomlParse      │  │                         │ │
//! │  │                 │  │  ConfigLoad..   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use holdfast_db::StoreError;
use thiserror::Error;

/// Result type alias for engine setup.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A setting is out of its allowed range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration could not be loaded for a reason other than I/O or parsing.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Reading the config file failed.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`HoldfastConfig`](crate::HoldfastConfig).
    #[error("Config file is not valid: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Opening or migrating the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::Io(_)
                | EngineError::TomlParse(_)
        )
    }
}
