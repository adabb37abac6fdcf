//! Status command - escrow book summary

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        return output::print_json(&status);
    }

    println!("{}", "Escrow Status".bold());
    println!("Network: {}", ctx.config.network);
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec!["Deals", &status.total_deals.to_string()]);
    for entry in &status.deals_by_status {
        if entry.count > 0 {
            table.add_row(vec![format!("  {}", entry.status), entry.count.to_string()]);
        }
    }
    table.add_row(vec!["Escrowed".to_string(), output::zec(status.escrowed_zec)]);
    table.add_row(vec!["Pending transactions", &status.pending_transactions.to_string()]);
    table.add_row(vec!["Wallets", &status.wallets.to_string()]);
    table.add_row(vec!["NEAR intents", &status.total_intents.to_string()]);

    println!("{}", table);
    println!();

    match &status.zcash_sync {
        Some(sync) => println!(
            "Zcash synced to height {} at {}",
            sync.last_block_height,
            output::timestamp(&sync.last_sync_time)
        ),
        None => output::warning("Monitor has not synced the Zcash chain yet"),
    }

    Ok(())
}
