//! # Holdfast Service
//!
//! Hosts the expiry reaper against the SQLite store until interrupted.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  tracing ─► HoldfastConfig::load ─► SqliteStore::open (migrations)      │
//! │                                          │                              │
//! │                      ┌───────────────────┴──────────────┐               │
//! │                      ▼                                  ▼               │
//! │              --sweep-once                        ExpiryReaper::spawn    │
//! │              one sweep, print report, exit       wait for Ctrl-C/TERM   │
//! │                                                  handle.stop()          │
//! │                                                  close pool             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! holdfast                          # run until Ctrl-C
//! holdfast --config ./holdfast.toml
//! holdfast --sweep-once             # release expired holds now and exit
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use holdfast_db::SqliteStore;
use holdfast_engine::{ExpiryReaper, HoldfastConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,holdfast=debug,sqlx=warn";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut sweep_once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--sweep-once" => sweep_once = true,
            "--help" | "-h" => {
                println!("Holdfast reservation service");
                println!();
                println!("Usage: holdfast [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <FILE>   Config file (default: platform config dir/holdfast.toml)");
                println!("      --sweep-once      Release expired holds once and exit");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!("Starting Holdfast service...");

    let config = HoldfastConfig::load(config_path)?;
    info!(
        ttl_secs = config.reservation.ttl_secs,
        reaper_enabled = config.reaper.enabled,
        reaper_interval_secs = config.reaper.interval_secs,
        db_path = %config.database.path.display(),
        "Configuration loaded"
    );

    let store = Arc::new(SqliteStore::open(config.db_config()).await?);
    if !store.database().health_check().await {
        warn!("Database health check failed after connect");
    }
    info!(products = store.product_count().await?, "Store ready");

    let reaper = ExpiryReaper::from_config(store.clone(), &config);

    if sweep_once {
        let report = reaper.sweep_once(chrono::Utc::now()).await;
        println!(
            "scanned {}  expired {}  units released {}  failures {}",
            report.scanned, report.expired, report.units_released, report.failures
        );
        store.database().close().await;
        return Ok(());
    }

    let handle = if config.reaper.enabled {
        Some(reaper.spawn())
    } else {
        warn!("Expiry reaper disabled; expired holds will keep stock pinned");
        None
    };

    shutdown_signal().await;

    if let Some(handle) = handle {
        let stats = handle.stop().await;
        info!(
            sweeps = stats.sweeps,
            expired = stats.expired,
            units_released = stats.units_released,
            failures = stats.failures,
            "Expiry reaper totals"
        );
    }

    store.database().close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}
