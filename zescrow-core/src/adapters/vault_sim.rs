//! Simulated EVM vault contract
//!
//! Holds escrowed funds in a dedicated Zcash wallet and records one
//! payout authorization per deal. Re-authorizing the same payout kind
//! returns the recorded hash, so a payout whose transfer failed can be
//! retried. Authorization hashes are SHA-256 over the payout so they are
//! stable across runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::state_file::JsonStore;
use crate::domain::result::{Error, Result};
use crate::domain::WalletKeys;
use crate::ports::{PayoutAuthorization, VaultContract, ZcashChain};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VaultState {
    /// Keyed by deal id
    payouts: BTreeMap<String, RecordedPayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordedPayout {
    tx_hash: String,
    payout: PayoutAuthorization,
    recorded_at: DateTime<Utc>,
}

pub struct SimulatedVault {
    contract_address: String,
    wallet: WalletKeys,
    store: JsonStore<VaultState>,
}

impl SimulatedVault {
    /// Bind the vault to the Zcash wallet derived from `seed`
    pub fn in_memory(zcash: &Arc<dyn ZcashChain>, seed: &str) -> Result<Self> {
        Self::with_store(zcash, seed, JsonStore::in_memory())
    }

    pub fn open(path: &Path, zcash: &Arc<dyn ZcashChain>, seed: &str) -> Result<Self> {
        Self::with_store(zcash, seed, JsonStore::open(path)?)
    }

    fn with_store(
        zcash: &Arc<dyn ZcashChain>,
        seed: &str,
        store: JsonStore<VaultState>,
    ) -> Result<Self> {
        let wallet = zcash.import_wallet(seed, Some("escrow vault"))?;
        let digest = hex::encode(Sha256::digest(format!("vault:{}", seed).as_bytes()));
        Ok(Self {
            contract_address: format!("0x{}", &digest[..40]),
            wallet,
            store,
        })
    }
}

impl VaultContract for SimulatedVault {
    fn contract_address(&self) -> String {
        self.contract_address.clone()
    }

    fn vault_wallet(&self) -> WalletKeys {
        self.wallet.clone()
    }

    fn authorize_payout(&self, payout: &PayoutAuthorization) -> Result<String> {
        if payout.amount_zatoshi <= 0 {
            return Err(Error::validation("Payout amount must be positive"));
        }
        self.store.update(|state| {
            if let Some(existing) = state.payouts.get(&payout.deal_id) {
                if existing.payout.kind == payout.kind {
                    tracing::debug!(deal_id = %payout.deal_id, tx_hash = %existing.tx_hash, "payout already authorized");
                    return Ok(existing.tx_hash.clone());
                }
                return Err(Error::conflict(format!(
                    "Deal {} already has a {} authorized in {}",
                    payout.deal_id, existing.payout.kind, existing.tx_hash
                )));
            }

            let mut hasher = Sha256::new();
            hasher.update(payout.deal_id.as_bytes());
            hasher.update(payout.intent_id.as_bytes());
            hasher.update(payout.kind.as_str().as_bytes());
            hasher.update(payout.recipient.as_bytes());
            hasher.update(payout.amount_zatoshi.to_le_bytes());
            let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));

            state.payouts.insert(
                payout.deal_id.clone(),
                RecordedPayout {
                    tx_hash: tx_hash.clone(),
                    payout: payout.clone(),
                    recorded_at: Utc::now(),
                },
            );
            Ok(tx_hash)
        })
    }
}
