//! Status service - escrow book summary

use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::amount::zatoshi_to_zec;
use crate::domain::{Blockchain, DealStatus, SyncState};
use crate::ports::IntentRegistry;

pub struct StatusService {
    repository: Arc<DuckDbRepository>,
    intents: Arc<dyn IntentRegistry>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>, intents: Arc<dyn IntentRegistry>) -> Self {
        Self {
            repository,
            intents,
        }
    }

    pub fn get_status(&self) -> Result<StatusSummary> {
        let counts = self.repository.count_deals_by_status()?;
        let deals_by_status = DealStatus::ALL
            .iter()
            .map(|status| StatusCount {
                status: *status,
                count: counts
                    .iter()
                    .find(|(s, _)| s == status)
                    .map(|(_, c)| *c)
                    .unwrap_or(0),
            })
            .collect::<Vec<_>>();
        let escrowed_zatoshi = self.repository.escrowed_zatoshi()?;

        Ok(StatusSummary {
            total_deals: deals_by_status.iter().map(|c| c.count).sum(),
            deals_by_status,
            escrowed_zatoshi,
            escrowed_zec: zatoshi_to_zec(escrowed_zatoshi),
            pending_transactions: self.repository.count_pending_transactions()?,
            wallets: self.repository.count_wallets()?,
            total_intents: self.intents.total_intents()?,
            zcash_sync: self.repository.get_sync_state(Blockchain::Zcash)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_deals: i64,
    pub deals_by_status: Vec<StatusCount>,
    /// Funds held for deals that have not reached a terminal state
    pub escrowed_zatoshi: i64,
    pub escrowed_zec: Decimal,
    pub pending_transactions: i64,
    pub wallets: i64,
    /// Intents registered on the NEAR contract
    pub total_intents: u64,
    pub zcash_sync: Option<SyncState>,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: DealStatus,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::near_sim::SimulatedIntentRegistry;

    #[test]
    fn test_empty_store() {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let intents = Arc::new(SimulatedIntentRegistry::in_memory("zescrow.testnet"));

        let status = StatusService::new(repo, intents).get_status().unwrap();
        assert_eq!(status.total_deals, 0);
        assert_eq!(status.total_intents, 0);
        assert_eq!(status.deals_by_status.len(), DealStatus::ALL.len());
        assert_eq!(status.escrowed_zatoshi, 0);
        assert!(status.zcash_sync.is_none());
    }
}
