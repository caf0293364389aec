//! # Settle Worker
//!
//! Background loops for the checkout database.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          settle-worker                                  │
//! │                                                                         │
//! │  every sweep_interval_secs ────► IntentSweeper (PENDING → EXPIRED)      │
//! │                              └─► outbox cleanup (delivered, old)        │
//! │                                                                         │
//! │  every dispatch_interval_secs ─► NotificationDispatcher ─► Notifier     │
//! │                                                                         │
//! │  SIGINT / SIGTERM ─────────────► finish current pass, close pool        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `settle-worker [--config <path>]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use settle_checkout::{CheckoutConfig, Clock, IntentSweeper, LogNotifier, NotificationDispatcher, SystemClock};
use settle_core::Tender;
use settle_db::Database;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,settle_checkout=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    info!("Starting settle worker...");

    let config = CheckoutConfig::load(config_path_from_args()?).context("loading configuration")?;
    info!(
        db = %config.database.path.display(),
        sweep_secs = config.worker.sweep_interval_secs,
        dispatch_secs = config.worker.dispatch_interval_secs,
        "Configuration loaded"
    );

    let gateways = config.gateways().context("building payment gateways")?;
    for tender in [Tender::HostedCheckout, Tender::Redirect] {
        if !gateways.is_configured(tender) {
            warn!(%tender, "No gateway configured; payments with this tender will be refused");
        }
    }

    let db = Database::new(config.db_config()).await.context("opening database")?;
    info!("Database ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sweeper = IntentSweeper::new(db.clone(), clock.clone());
    let dispatcher = NotificationDispatcher::new(db.clone(), Arc::new(LogNotifier), clock, &config.worker);

    let mut sweep_tick = tokio::time::interval(Duration::from_secs(config.worker.sweep_interval_secs));
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut dispatch_tick = tokio::time::interval(Duration::from_secs(config.worker.dispatch_interval_secs));
    dispatch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = sweep_tick.tick() => {
                if let Err(e) = sweeper.sweep().await {
                    error!(error = %e, retryable = e.is_retryable(), "Intent sweep failed");
                }
                if let Err(e) = dispatcher.cleanup().await {
                    error!(error = %e, "Notification cleanup failed");
                }
            }
            _ = dispatch_tick.tick() => {
                if let Err(e) = dispatcher.dispatch_pending().await {
                    error!(error = %e, retryable = e.is_retryable(), "Notification dispatch failed");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    db.close().await;
    info!("Worker shutdown complete");
    Ok(())
}

fn config_path_from_args() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (None, _) => Ok(None),
        (Some("--config"), Some(path)) => Ok(Some(PathBuf::from(path))),
        (Some(other), _) => bail!("unexpected argument {other:?}; usage: settle-worker [--config <path>]"),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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

    info!("Shutdown signal received, stopping worker...");
}
