//! zescrow CLI - escrow engine operator tool

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{deal, doctor, logs, monitor, serve, status, wallet};

/// zescrow - private escrow for freelance deals
#[derive(Parser)]
#[command(name = "zescrow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API together with the confirmation monitor
    Serve {
        /// Address to bind (overrides settings)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides settings)
        #[arg(long, short)]
        port: Option<u16>,
        /// Don't start the confirmation monitor
        #[arg(long)]
        no_monitor: bool,
    },

    /// Show escrow book summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run store health checks
    Doctor {
        /// Show verbose output
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile pending transactions with the chain
    Monitor {
        /// Keep polling on the configured interval
        #[arg(long, short)]
        watch: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage user wallets
    Wallet {
        #[command(subcommand)]
        command: wallet::WalletCommands,
    },

    /// Create and drive escrow deals
    Deal {
        #[command(subcommand)]
        command: deal::DealCommands,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

/// Default log filter for long-running commands
const SERVICE_LOG_FILTER: &str = "zescrow=info,zescrow_core=info,tower_http=info";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match &cli.command {
        Commands::Serve { .. } | Commands::Monitor { watch: true, .. } => SERVICE_LOG_FILTER,
        _ => "warn",
    };
    commands::init_tracing(filter);

    let command = cli.command.name();
    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{:#}", e);
            if let Some(logger) = commands::get_logger() {
                let _ = logger.log_error("command_failed", &message, Some(command));
            }
            output::error(&message);
            ExitCode::FAILURE
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Status { .. } => "status",
            Commands::Doctor { .. } => "doctor",
            Commands::Monitor { .. } => "monitor",
            Commands::Wallet { .. } => "wallet",
            Commands::Deal { .. } => "deal",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { bind, port, no_monitor } => serve::run(bind, port, no_monitor),
        Commands::Status { json } => status::run(json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Monitor { watch, json } => monitor::run(watch, json),
        Commands::Wallet { command } => wallet::run(command),
        Commands::Deal { command } => deal::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
