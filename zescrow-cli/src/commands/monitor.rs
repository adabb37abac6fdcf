//! Monitor command - one reconciliation pass, or a polling loop with --watch

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::sync::watch;
use zescrow_core::services::{MonitorLock, MonitorReport};
use zescrow_core::LogEvent;

use super::{get_context, get_data_dir, get_logger, log_event};
use crate::output;

pub fn run(watch_mode: bool, json: bool) -> Result<()> {
    if watch_mode {
        return run_watch();
    }

    let ctx = get_context()?;
    let logger = get_logger();
    let report = ctx.monitor.check_transactions()?;
    for deal_id in &report.completed_deals {
        log_event(&logger, LogEvent::new("deal_completed").with_deal(deal_id));
    }

    if json {
        return output::print_json(&report);
    }
    print_report(&report, ctx.monitor.settings().confirmation_blocks);
    Ok(())
}

fn print_report(report: &MonitorReport, required: u32) {
    println!("{}", "Monitor Pass".bold());
    println!("  Tip height:     {}", report.tip_height);
    println!("  Checked:        {}", report.checked);
    println!("  Confirmed:      {}", report.confirmed.to_string().green());
    println!(
        "  Still pending:  {} (need {} confirmations)",
        report.still_pending, required
    );
    if report.missing > 0 {
        println!("  Not on chain:   {}", report.missing.to_string().yellow());
    }
    if report.failed > 0 {
        println!("  Failed:         {}", report.failed.to_string().red());
    }
    if report.errors > 0 {
        println!("  Errors:         {}", report.errors.to_string().red());
    }
    for deal_id in &report.completed_deals {
        output::success(&format!("Deal {} completed", deal_id));
    }
}

fn run_watch() -> Result<()> {
    let data_dir = get_data_dir()?;
    let ctx = get_context()?;
    let _lock = MonitorLock::acquire(&data_dir)?;
    let monitor = Arc::clone(&ctx.monitor);

    output::info(&format!(
        "Watching pending transactions every {}ms (Ctrl+C to stop)",
        monitor.settings().update_interval_ms
    ));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(monitor.run(shutdown_rx));

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        let _ = shutdown_tx.send(true);
        task.await.context("Monitor task failed")?;
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(())
}
