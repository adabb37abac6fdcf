//! Confirmation monitor - reconciles pending transactions with the chain
//!
//! Each pass syncs the Zcash backend, then walks every pending Zcash
//! transaction oldest first. Updates are guarded on `status = 'pending'`,
//! so replaying a pass (or two passes racing) never double-applies a
//! settlement. A confirmed release completes its deal in the same database
//! transaction.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::MonitorSettings;
use crate::domain::result::Result;
use crate::domain::{Blockchain, ChainTransaction, SyncState, TxStatus, TxType};
use crate::ports::ZcashChain;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub tip_height: u64,
    pub checked: usize,
    pub confirmed: usize,
    pub still_pending: usize,
    pub failed: usize,
    /// Unknown to the chain but still inside the failure timeout
    pub missing: usize,
    pub errors: usize,
    pub completed_deals: Vec<String>,
}

impl MonitorReport {
    pub fn has_changes(&self) -> bool {
        self.confirmed > 0 || self.failed > 0 || !self.completed_deals.is_empty()
    }
}

enum Outcome {
    Confirmed { deal_completed: bool },
    Pending,
    Failed,
    Missing,
    /// Another pass settled it first
    Skipped,
}

pub struct ConfirmationMonitor {
    repository: Arc<DuckDbRepository>,
    zcash: Arc<dyn ZcashChain>,
    settings: MonitorSettings,
}

impl ConfirmationMonitor {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        zcash: Arc<dyn ZcashChain>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            repository,
            zcash,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run a single reconciliation pass
    pub fn check_transactions(&self) -> Result<MonitorReport> {
        let tip_height = self.zcash.sync()?;
        self.repository.update_sync_state(&SyncState {
            blockchain: Blockchain::Zcash,
            last_block_height: tip_height,
            last_sync_time: Utc::now(),
        })?;

        let pending = self.repository.get_pending_transactions(Blockchain::Zcash)?;
        let mut report = MonitorReport {
            tip_height,
            checked: pending.len(),
            ..Default::default()
        };

        for tx in &pending {
            match self.reconcile(tx) {
                Ok(Outcome::Confirmed { deal_completed }) => {
                    report.confirmed += 1;
                    if deal_completed {
                        tracing::info!(deal_id = %tx.deal_id, tx_id = %tx.tx_id, "deal completed");
                        report.completed_deals.push(tx.deal_id.clone());
                    }
                }
                Ok(Outcome::Pending) => report.still_pending += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Missing) => report.missing += 1,
                Ok(Outcome::Skipped) => {}
                Err(e) => {
                    tracing::warn!(tx_id = %tx.tx_id, "reconciliation failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    fn reconcile(&self, tx: &ChainTransaction) -> Result<Outcome> {
        let required = self.settings.confirmation_blocks;

        let Some(status) = self.zcash.transaction_status(&tx.tx_id)? else {
            if Utc::now() - tx.created_at < self.settings.failure_timeout() {
                return Ok(Outcome::Missing);
            }
            let settlement =
                self.repository
                    .settle_transaction(&tx.tx_id, TxStatus::Failed, 0, None, None)?;
            if settlement.transaction_updated {
                tracing::warn!(tx_id = %tx.tx_id, deal_id = %tx.deal_id, "transaction failed: never seen on chain");
                return Ok(Outcome::Failed);
            }
            return Ok(Outcome::Skipped);
        };

        if status.confirmations < required {
            if status.confirmations != tx.confirmations {
                self.repository.update_confirmations(
                    &tx.tx_id,
                    status.confirmations,
                    status.block_height,
                )?;
            }
            return Ok(Outcome::Pending);
        }

        let complete_deal = (tx.tx_type == TxType::Release).then_some(tx.deal_id.as_str());
        let settlement = self.repository.settle_transaction(
            &tx.tx_id,
            TxStatus::Confirmed,
            status.confirmations,
            status.block_height,
            complete_deal,
        )?;
        if !settlement.transaction_updated {
            return Ok(Outcome::Skipped);
        }
        tracing::debug!(tx_id = %tx.tx_id, confirmations = status.confirmations, "transaction confirmed");
        Ok(Outcome::Confirmed {
            deal_completed: settlement.deal_completed,
        })
    }

    /// Poll on the configured interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.update_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_ms = self.settings.update_interval_ms,
            confirmations = self.settings.confirmation_blocks,
            "confirmation monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let monitor = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || monitor.check_transactions()).await {
                        Ok(Ok(report)) if report.has_changes() => {
                            tracing::info!(
                                tip = report.tip_height,
                                confirmed = report.confirmed,
                                failed = report.failed,
                                completed = report.completed_deals.len(),
                                "monitor pass"
                            );
                        }
                        Ok(Ok(report)) => {
                            tracing::debug!(tip = report.tip_height, pending = report.still_pending, "monitor pass");
                        }
                        Ok(Err(e)) => tracing::warn!("monitor pass failed: {}", e),
                        Err(e) => tracing::error!("monitor task aborted: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("confirmation monitor stopped");
    }
}

/// Exclusive `monitor.lock` in the data directory, held for the life of the value
pub struct MonitorLock {
    file: File,
}

impl MonitorLock {
    pub fn acquire(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join("monitor.lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.try_lock_exclusive()
            .map_err(|_| anyhow!("Another monitor is already running ({})", path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for MonitorLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::zcash_sim::SimulatedZcash;
    use crate::domain::Network;
    use tempfile::tempdir;

    fn setup(confirmations: u32) -> (Arc<DuckDbRepository>, Arc<SimulatedZcash>, ConfirmationMonitor) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let zcash = Arc::new(SimulatedZcash::in_memory(Network::Testnet));
        let monitor = ConfirmationMonitor::new(
            Arc::clone(&repo),
            zcash.clone(),
            MonitorSettings {
                confirmation_blocks: confirmations,
                ..Default::default()
            },
        );
        (repo, zcash, monitor)
    }

    #[test]
    fn test_empty_pass_records_sync_state() {
        let (repo, _zcash, monitor) = setup(3);
        let report = monitor.check_transactions().unwrap();
        assert_eq!(report.tip_height, 1);
        assert_eq!(report.checked, 0);
        assert!(!report.has_changes());

        let state = repo.get_sync_state(Blockchain::Zcash).unwrap().unwrap();
        assert_eq!(state.last_block_height, 1);
    }

    #[test]
    fn test_unknown_transaction_stays_pending_inside_timeout() {
        let (repo, _zcash, monitor) = setup(3);
        repo.insert_transactions(&[ChainTransaction::pending(
            "tx-ghost",
            "deal-x",
            Blockchain::Zcash,
            TxType::Escrow,
            "a",
            "b",
            10,
        )])
        .unwrap();

        let report = monitor.check_transactions().unwrap();
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_unknown_transaction_fails_after_timeout() {
        let (repo, _zcash, monitor) = setup(3);
        let mut ghost = ChainTransaction::pending(
            "tx-ghost",
            "deal-x",
            Blockchain::Zcash,
            TxType::Escrow,
            "a",
            "b",
            10,
        );
        ghost.created_at = Utc::now() - chrono::Duration::hours(2);
        repo.insert_transactions(&[ghost]).unwrap();

        let report = monitor.check_transactions().unwrap();
        assert_eq!(report.failed, 1);

        let stored = repo.get_transaction("tx-ghost").unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::Failed);
        assert_eq!(monitor.check_transactions().unwrap().checked, 0);
    }

    #[test]
    fn test_monitor_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let first = MonitorLock::acquire(dir.path()).unwrap();
        assert!(MonitorLock::acquire(dir.path()).is_err());
        drop(first);
        assert!(MonitorLock::acquire(dir.path()).is_ok());
    }
}
