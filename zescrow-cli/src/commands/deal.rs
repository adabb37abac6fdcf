//! Deal commands - create deals and drive them through their lifecycle

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use rust_decimal::Decimal;
use zescrow_core::domain::{Resolution, TxStatus};
use zescrow_core::services::{CreateDeal, ResolveDispute, SubmitWork};
use zescrow_core::{ChainTransaction, Deal, DealStatus, LogEvent};

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum DealCommands {
    /// Fund a new escrow deal from the client's wallet
    Create {
        #[arg(long)]
        client: String,
        #[arg(long)]
        freelancer: String,
        /// Amount in ZEC
        #[arg(long)]
        amount: Decimal,
        /// Days until the deadline
        #[arg(long, default_value = "14")]
        days: u32,
        #[arg(long)]
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a deal
    Show {
        deal_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List deals, optionally for one user or status
    List {
        /// Only deals where this user is client or freelancer
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        status: Option<DealStatus>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the chain transactions of a deal
    Txs {
        deal_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit work as the freelancer
    Submit {
        deal_id: String,
        #[arg(long)]
        freelancer: String,
        /// Link to the delivered work
        #[arg(long)]
        proof: String,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Approve submitted work and release funds
    Approve {
        deal_id: String,
        #[arg(long)]
        client: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dispute submitted work
    Dispute {
        deal_id: String,
        #[arg(long)]
        client: String,
        #[arg(long)]
        reason: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle a dispute as an administrator
    Resolve {
        deal_id: String,
        #[arg(long)]
        admin: String,
        /// Who gets the funds: client or freelancer
        #[arg(long)]
        favor: Resolution,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel an unstarted deal and refund the client
    Cancel {
        deal_id: String,
        #[arg(long)]
        client: String,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn print_deal(deal: &Deal) {
    println!("{} {}", "Deal".bold(), deal.deal_id);
    println!("  Status:      {}", output::status(deal.status));
    println!("  Amount:      {} ({} zatoshi)", output::zec(deal.amount_zec), deal.amount_zatoshi);
    println!("  Client:      {} ({})", deal.client.id, deal.client.near_account_id);
    println!("  Freelancer:  {} ({})", deal.freelancer.id, deal.freelancer.near_account_id);
    println!("  Deadline:    {}", output::timestamp(&deal.deadline));
    println!("  Intent:      {}", deal.intent_id);
    println!("  Description: {}", deal.description);
    if let Some(link) = &deal.proof_link {
        println!("  Proof:       {}", link);
    }
    if let Some(notes) = &deal.notes {
        println!("  Notes:       {}", notes);
    }
    if let Some(reason) = &deal.dispute_reason {
        println!("  Dispute:     {}", reason.yellow());
    }
    if let Some(resolution) = deal.resolution {
        println!("  Resolved in favour of {}", resolution);
    }
}

fn print_deals(deals: &[Deal]) {
    if deals.is_empty() {
        println!("No deals found.");
        return;
    }
    let mut table = output::create_table();
    table.set_header(vec!["Deal", "Status", "Amount", "Client", "Freelancer", "Updated"]);
    for deal in deals {
        table.add_row(vec![
            deal.deal_id.clone(),
            deal.status.to_string(),
            output::zec(deal.amount_zec),
            deal.client.id.clone(),
            deal.freelancer.id.clone(),
            output::timestamp(&deal.updated_at),
        ]);
    }
    println!("{}", table);
}

fn print_transactions(txs: &[ChainTransaction]) {
    if txs.is_empty() {
        println!("No transactions recorded.");
        return;
    }
    let mut table = output::create_table();
    table.set_header(vec!["Tx", "Chain", "Type", "Amount", "Status", "Conf.", "Created"]);
    for tx in txs {
        let status = match tx.status {
            TxStatus::Confirmed => tx.status.as_str().green().to_string(),
            TxStatus::Failed => tx.status.as_str().red().to_string(),
            TxStatus::Pending => tx.status.as_str().yellow().to_string(),
        };
        table.add_row(vec![
            output::short(&tx.tx_id, 18),
            tx.blockchain.to_string(),
            tx.tx_type.to_string(),
            tx.amount_zatoshi.to_string(),
            status,
            tx.confirmations.to_string(),
            output::timestamp(&tx.created_at),
        ]);
    }
    println!("{}", table);
}

/// Print the outcome of a lifecycle action
fn finish(deal: &Deal, message: &str, json: bool) -> Result<()> {
    if json {
        return output::print_json(deal);
    }
    output::success(message);
    print_deal(deal);
    Ok(())
}

pub fn run(command: DealCommands) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();
    let escrow = &ctx.escrow_service;

    match command {
        DealCommands::Create { client, freelancer, amount, days, description, json } => {
            let deal = escrow.create_deal(CreateDeal {
                client_id: client.clone(),
                freelancer_id: freelancer,
                amount_zec: amount,
                deadline_days: days,
                description,
            })?;
            log_event(&logger, LogEvent::new("deal_created").with_deal(&deal.deal_id).with_user(&client));
            finish(&deal, "Deal created and funded", json)?;
        }
        DealCommands::Show { deal_id, json } => {
            let deal = escrow.get_deal(&deal_id)?;
            if json {
                return output::print_json(&deal);
            }
            print_deal(&deal);
        }
        DealCommands::List { user, status, limit, json } => {
            let mut deals = match &user {
                Some(user_id) => escrow.get_user_deals(user_id)?,
                None => escrow.list_deals(status, limit)?,
            };
            if user.is_some() {
                deals.retain(|d| status.map_or(true, |s| d.status == s));
                deals.truncate(limit);
            }
            if json {
                return output::print_json(&deals);
            }
            print_deals(&deals);
        }
        DealCommands::Txs { deal_id, json } => {
            let txs = escrow.get_deal_transactions(&deal_id)?;
            if json {
                return output::print_json(&txs);
            }
            print_transactions(&txs);
        }
        DealCommands::Submit { deal_id, freelancer, proof, notes, json } => {
            let deal = escrow.submit_work(
                &deal_id,
                &freelancer,
                SubmitWork {
                    proof_link: proof,
                    notes,
                },
            )?;
            log_event(&logger, LogEvent::new("work_submitted").with_deal(&deal_id).with_user(&freelancer));
            finish(&deal, "Work submitted", json)?;
        }
        DealCommands::Approve { deal_id, client, json } => {
            let deal = escrow.approve_work(&deal_id, &client)?;
            log_event(&logger, LogEvent::new("work_approved").with_deal(&deal_id).with_user(&client));
            finish(&deal, "Work approved; release sent to the freelancer", json)?;
        }
        DealCommands::Dispute { deal_id, client, reason, json } => {
            let deal = escrow.dispute_work(&deal_id, &client, &reason)?;
            log_event(&logger, LogEvent::new("work_disputed").with_deal(&deal_id).with_user(&client));
            finish(&deal, "Dispute opened", json)?;
        }
        DealCommands::Resolve { deal_id, admin, favor, notes, json } => {
            let deal = escrow.resolve_dispute(
                &deal_id,
                &admin,
                ResolveDispute {
                    resolution: favor,
                    notes,
                },
            )?;
            log_event(&logger, LogEvent::new("dispute_resolved").with_deal(&deal_id).with_user(&admin));
            finish(&deal, &format!("Dispute resolved in favour of the {}", favor), json)?;
        }
        DealCommands::Cancel { deal_id, client, force, json } => {
            if !force && !json {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Cancel {} and refund the client?", deal_id))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            let deal = escrow.cancel_deal(&deal_id, &client)?;
            log_event(&logger, LogEvent::new("deal_cancelled").with_deal(&deal_id).with_user(&client));
            finish(&deal, "Deal cancelled; refund sent to the client", json)?;
        }
    }

    Ok(())
}
