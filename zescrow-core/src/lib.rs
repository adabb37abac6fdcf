//! zescrow Core - escrow deal engine
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Deal, ChainTransaction, Wallet, EscrowIntent)
//! - **ports**: Trait definitions for the chains (Zcash, NEAR intents, EVM vault)
//! - **services**: Business logic orchestration (escrow lifecycle, monitor, status)
//! - **adapters**: Concrete implementations (DuckDB, simulated chains)
//! - **api**: REST surface over the services

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use adapters::duckdb::DuckDbRepository;
use adapters::near_sim::SimulatedIntentRegistry;
use adapters::vault_sim::SimulatedVault;
use adapters::zcash_sim::SimulatedZcash;
use config::Config;
use ports::{IntentRegistry, VaultContract, ZcashChain};
use services::{ConfirmationMonitor, DoctorService, EscrowService, StatusService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result};
pub use domain::{ChainTransaction, Deal, DealStatus, EscrowIntent, Network, Wallet};
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Main context for escrow operations
///
/// Holds the store, the chain backends, and every service built on them.
/// The API server and the CLI both go through this.
pub struct EscrowContext {
    pub config: Config,
    pub data_dir: Option<PathBuf>,
    pub repository: Arc<DuckDbRepository>,
    pub zcash: Arc<dyn ZcashChain>,
    pub intents: Arc<dyn IntentRegistry>,
    pub vault: Arc<dyn VaultContract>,
    pub escrow_service: EscrowService,
    pub monitor: Arc<ConfirmationMonitor>,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
}

impl EscrowContext {
    /// Open the context stored in `data_dir`
    ///
    /// Layout:
    /// - `settings.json` (optional)
    /// - `zescrow.duckdb`
    /// - `chain/zcash-ledger.json`, `chain/near-intents.json`, `chain/vault.json`
    pub fn new(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        let config = Config::load(data_dir)?;

        let chain_dir = data_dir.join("chain");
        let zcash: Arc<dyn ZcashChain> = Arc::new(SimulatedZcash::open(
            &chain_dir.join("zcash-ledger.json"),
            config.network,
        )?);
        let intents: Arc<dyn IntentRegistry> = Arc::new(SimulatedIntentRegistry::open(
            &chain_dir.join("near-intents.json"),
            config.escrow.near_owner_account.clone(),
        )?);
        let vault: Arc<dyn VaultContract> = Arc::new(SimulatedVault::open(
            &chain_dir.join("vault.json"),
            &zcash,
            &config.escrow.vault_seed,
        )?);

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join("zescrow.duckdb"))?);
        repository.ensure_schema()?;

        let mut context = Self::with_chains(config, repository, zcash, intents, vault);
        context.data_dir = Some(data_dir.to_path_buf());
        Ok(context)
    }

    /// Fully in-memory context: throwaway store and fresh simulated chains
    pub fn in_memory(config: Config) -> anyhow::Result<Self> {
        let zcash: Arc<dyn ZcashChain> = Arc::new(SimulatedZcash::in_memory(config.network));
        let intents: Arc<dyn IntentRegistry> = Arc::new(SimulatedIntentRegistry::in_memory(
            config.escrow.near_owner_account.clone(),
        ));
        let vault: Arc<dyn VaultContract> =
            Arc::new(SimulatedVault::in_memory(&zcash, &config.escrow.vault_seed)?);

        let repository = Arc::new(DuckDbRepository::open_in_memory()?);
        repository.ensure_schema()?;

        Ok(Self::with_chains(config, repository, zcash, intents, vault))
    }

    /// Assemble services over caller-supplied backends
    pub fn with_chains(
        config: Config,
        repository: Arc<DuckDbRepository>,
        zcash: Arc<dyn ZcashChain>,
        intents: Arc<dyn IntentRegistry>,
        vault: Arc<dyn VaultContract>,
    ) -> Self {
        let escrow_service = EscrowService::new(
            Arc::clone(&repository),
            Arc::clone(&zcash),
            Arc::clone(&intents),
            Arc::clone(&vault),
            config.escrow.clone(),
        );
        let monitor = Arc::new(ConfirmationMonitor::new(
            Arc::clone(&repository),
            Arc::clone(&zcash),
            config.monitor.clone(),
        ));
        let status_service = StatusService::new(Arc::clone(&repository), Arc::clone(&intents));
        let doctor_service = DoctorService::new(Arc::clone(&repository), config.monitor.clone());

        Self {
            config,
            data_dir: None,
            repository,
            zcash,
            intents,
            vault,
            escrow_service,
            monitor,
            status_service,
            doctor_service,
        }
    }
}
