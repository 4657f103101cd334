//! geotrack - collects location reports from client machines
//!
//! Serves a small JSON API over a single SQLite table:
//! - Ingestion of reports with optional API key protection
//! - Queries by machine, by date, or paginated, plus a per-machine time window
//! - Machine roster, statistics and database size/schema introspection
//! - Confirmed bulk deletion for administrators

mod config;
mod db;
mod units;
mod web;

use anyhow::Result;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Console plus one log file per day. The returned guard flushes the file writer on drop.
///
/// Use LOG_FORMAT=gcp for structured GCP Cloud Logging on the console.
fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    std::fs::create_dir_all(&config.directory)?;
    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        registry.with(tracing_stackdriver::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Starting geotrack...");
    if config.auth_enabled() {
        info!("API key authentication enabled");
    } else {
        warn!("No API key configured, ingestion and admin endpoints are open");
    }

    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized at {}", db.path().display());

    // Blocks until a shutdown signal has drained in-flight requests
    let served = web::start_server(&config, db.clone()).await;

    db.close().await;
    served
}
