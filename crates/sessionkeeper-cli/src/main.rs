//! sessionkeeper - log in to an auth service and keep the session fresh.
//!
//! The access/refresh token pair is persisted between runs; `watch` keeps
//! the process alive so the proactive refresh can be observed.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessionkeeper_core::{Config, HttpAuthApi, SessionManager, SessionStore};

use commands::Command;

/// Directory for an optional daily rolling log file
const ENV_LOG_DIR: &str = "SESSIONKEEPER_LOG_DIR";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file writer and must outlive `main`'s work.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "sessionkeeper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn build_manager(config: &Config) -> Result<SessionManager> {
    let api = HttpAuthApi::from_config(config).context("Failed to create HTTP client")?;
    let backend = config.storage.open()?;
    Ok(SessionManager::with_refresh_skew(
        Arc::new(api),
        SessionStore::new(backend),
        config.refresh_skew_secs,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n", e);
            eprintln!("{}", commands::USAGE);
            std::process::exit(2);
        }
    };
    if let Command::Help = command {
        println!("{}", commands::USAGE);
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env()?;
    info!(api = %config.api_base_url, storage = ?config.storage, "sessionkeeper starting");

    let manager = build_manager(&config)?;
    let result = commands::run(command, &manager).await;

    info!("sessionkeeper shutting down");
    result
}
