//! CLI command implementations

pub mod deal;
pub mod doctor;
pub mod logs;
pub mod monitor;
pub mod serve;
pub mod status;
pub mod wallet;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zescrow_core::{EntryPoint, EscrowContext, LogEvent, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// `ZESCROW_DIR`, or `~/.zescrow`
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ZESCROW_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".zescrow"))
        .ok_or_else(|| anyhow!("Could not find home directory; set ZESCROW_DIR"))
}

/// Open the escrow context in the data directory
pub fn get_context() -> Result<EscrowContext> {
    let data_dir = get_data_dir()?;
    EscrowContext::new(&data_dir).context("Failed to initialize zescrow context")
}

/// Install the tracing subscriber; `RUST_LOG` wins over `default_filter`
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
