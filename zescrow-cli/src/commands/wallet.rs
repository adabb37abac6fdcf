//! Wallet commands - create, import, inspect and fund user wallets

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Password;
use rust_decimal::Decimal;
use zescrow_core::domain::Pool;
use zescrow_core::services::WalletView;
use zescrow_core::LogEvent;

use super::{get_context, get_logger, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a fresh wallet for a user
    Create {
        /// User id (at least 8 characters)
        user_id: String,
        #[arg(long)]
        label: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a wallet from a seed phrase
    Import {
        user_id: String,
        /// Seed phrase (prompted when omitted)
        #[arg(long)]
        seed: Option<String>,
        #[arg(long)]
        label: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user's wallet and balance
    Show {
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Credit test funds to a wallet (development faucet)
    Fund {
        user_id: String,
        /// Amount in ZEC
        amount: Decimal,
        /// Credit the transparent pool instead of shielded
        #[arg(long)]
        transparent: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn print_wallet(view: &WalletView) {
    let wallet = &view.wallet;
    println!("{}", format!("Wallet for {}", wallet.user_id).bold());
    println!("  ID:           {}", wallet.wallet_id);
    if let Some(label) = &wallet.label {
        println!("  Label:        {}", label);
    }
    println!("  Shielded:     {}", wallet.shielded_address);
    println!("  Transparent:  {}", wallet.transparent_address);
    println!(
        "  Balance:      {} (shielded {} / transparent {} zatoshi)",
        output::zec(view.balance_zec).green(),
        view.balance.shielded,
        view.balance.transparent
    );
}

pub fn run(command: WalletCommands) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();
    let escrow = &ctx.escrow_service;

    match command {
        WalletCommands::Create { user_id, label, json } => {
            escrow.create_user_wallet(&user_id, label.as_deref())?;
            log_event(&logger, LogEvent::new("wallet_created").with_user(&user_id).with_command("wallet create"));
            let view = escrow.get_wallet(&user_id)?;
            if json {
                return output::print_json(&view);
            }
            output::success("Wallet created");
            print_wallet(&view);
        }
        WalletCommands::Import { user_id, seed, label, json } => {
            let seed = match seed {
                Some(seed) => seed,
                None => Password::new().with_prompt("Seed phrase").interact()?,
            };
            escrow.import_user_wallet(&user_id, &seed, label.as_deref())?;
            log_event(&logger, LogEvent::new("wallet_imported").with_user(&user_id).with_command("wallet import"));
            let view = escrow.get_wallet(&user_id)?;
            if json {
                return output::print_json(&view);
            }
            output::success("Wallet imported");
            print_wallet(&view);
        }
        WalletCommands::Show { user_id, json } => {
            let view = escrow.get_wallet(&user_id)?;
            if json {
                return output::print_json(&view);
            }
            print_wallet(&view);
        }
        WalletCommands::Fund { user_id, amount, transparent, json } => {
            let pool = if transparent { Pool::Transparent } else { Pool::Shielded };
            let view = escrow.fund_wallet(&user_id, amount, pool)?;
            if json {
                return output::print_json(&view);
            }
            output::success(&format!("Credited {}", output::zec(amount)));
            print_wallet(&view);
        }
    }

    Ok(())
}
