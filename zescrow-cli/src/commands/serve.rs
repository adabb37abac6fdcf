//! Serve command - REST API plus the confirmation monitor

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use zescrow_core::api::{self, AppState};
use zescrow_core::services::MonitorLock;
use zescrow_core::{EntryPoint, LoggingService};

use super::{get_context, get_data_dir};

pub fn run(bind: Option<String>, port: Option<u16>, no_monitor: bool) -> Result<()> {
    let data_dir = get_data_dir()?;
    let ctx = Arc::new(get_context()?);

    let bind = bind.unwrap_or_else(|| ctx.config.api.bind.clone());
    let port = port.unwrap_or(ctx.config.api.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", bind, port))?;

    let mut state = AppState::new(Arc::clone(&ctx));
    let logger = LoggingService::new(&data_dir, EntryPoint::Server, env!("CARGO_PKG_VERSION"))
        .map(Arc::new)
        .map_err(|e| tracing::warn!("event log unavailable: {:#}", e))
        .ok();
    if let Some(logger) = &logger {
        state = state.with_logger(Arc::clone(logger));
        let _ = logger.log_event("server_started");
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Held until the server stops
        let mut monitor_lock = None;
        let mut monitor_task = None;
        if !no_monitor {
            match MonitorLock::acquire(&data_dir) {
                Ok(lock) => {
                    monitor_lock = Some(lock);
                    monitor_task = Some(tokio::spawn(Arc::clone(&ctx.monitor).run(shutdown_rx)));
                }
                Err(e) => tracing::warn!("confirmation monitor not started: {:#}", e),
            }
        }

        tracing::info!(network = %ctx.config.network, "starting zescrow API");
        let served = api::serve(state, addr, shutdown_signal()).await;

        let _ = shutdown_tx.send(true);
        if let Some(task) = monitor_task {
            let _ = task.await;
        }
        drop(monitor_lock);
        served
    })?;

    if let Some(logger) = &logger {
        let _ = logger.log_event("server_stopped");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
