//! Simulated Zcash wallet backend
//!
//! A deterministic in-process ledger: wallets, balances split by pool,
//! and a block counter that advances one block per `sync`. Transactions
//! are mined into the next block after they are sent. Addresses are
//! derived from SHA-256 of the seed phrase, so importing a seed twice is
//! idempotent.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::state_file::JsonStore;
use crate::domain::result::{Error, Result};
use crate::domain::{Network, Pool, WalletBalance, WalletKeys};
use crate::ports::{SentTransaction, TxConfirmation, ZcashChain};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerState {
    tip_height: u64,
    wallets: BTreeMap<String, SimWallet>,
    transactions: BTreeMap<String, SimTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimWallet {
    wallet_id: String,
    label: Option<String>,
    transparent_address: String,
    shielded_address: String,
    transparent: i64,
    shielded: i64,
}

impl SimWallet {
    fn keys(&self) -> WalletKeys {
        WalletKeys {
            wallet_id: self.wallet_id.clone(),
            transparent_address: self.transparent_address.clone(),
            shielded_address: self.shielded_address.clone(),
        }
    }

    fn balance(&self) -> WalletBalance {
        WalletBalance {
            transparent: self.transparent,
            shielded: self.shielded,
        }
    }

    fn owns(&self, address: &str) -> bool {
        self.transparent_address == address || self.shielded_address == address
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimTransaction {
    tx_id: String,
    from_address: String,
    to_address: String,
    amount: i64,
    fee: i64,
    memo: Option<String>,
    mined_height: Option<u64>,
    created_at: DateTime<Utc>,
}

pub struct SimulatedZcash {
    network: Network,
    fee: i64,
    store: JsonStore<LedgerState>,
}

impl SimulatedZcash {
    pub fn in_memory(network: Network) -> Self {
        Self {
            network,
            fee: crate::domain::amount::DEFAULT_FEE_ZATOSHI,
            store: JsonStore::in_memory(),
        }
    }

    /// Ledger persisted at `path`
    pub fn open(path: &Path, network: Network) -> Result<Self> {
        Ok(Self {
            network,
            fee: crate::domain::amount::DEFAULT_FEE_ZATOSHI,
            store: JsonStore::open(path)?,
        })
    }

    /// Advance the chain by `blocks`, mining anything unconfirmed into the first one
    pub fn mine_blocks(&self, blocks: u64) -> Result<u64> {
        self.store.update(|state| {
            for _ in 0..blocks {
                Self::mine_block(state);
            }
            Ok(state.tip_height)
        })
    }

    pub fn tip_height(&self) -> Result<u64> {
        self.store.read(|state| state.tip_height)
    }

    fn mine_block(state: &mut LedgerState) {
        state.tip_height += 1;
        let height = state.tip_height;
        for tx in state.transactions.values_mut() {
            if tx.mined_height.is_none() {
                tx.mined_height = Some(height);
            }
        }
    }

    fn derive_keys(&self, seed_phrase: &str) -> WalletKeys {
        let shielded = hex::encode(Sha256::digest(seed_phrase.as_bytes()));
        let transparent = hex::encode(Sha256::digest(format!("t:{}", seed_phrase).as_bytes()));
        WalletKeys {
            wallet_id: format!("wallet-{}", &shielded[..16]),
            transparent_address: format!("{}{}", self.network.transparent_prefix(), &transparent[..33]),
            shielded_address: format!("{}{}", self.network.shielded_prefix(), shielded),
        }
    }

    fn register(&self, keys: WalletKeys, label: Option<&str>) -> Result<WalletKeys> {
        self.store.update(|state| {
            let wallet = state
                .wallets
                .entry(keys.wallet_id.clone())
                .or_insert_with(|| SimWallet {
                    wallet_id: keys.wallet_id.clone(),
                    label: label.map(str::to_string),
                    transparent_address: keys.transparent_address.clone(),
                    shielded_address: keys.shielded_address.clone(),
                    transparent: 0,
                    shielded: 0,
                });
            Ok(wallet.keys())
        })
    }
}

impl ZcashChain for SimulatedZcash {
    fn network(&self) -> Network {
        self.network
    }

    fn create_wallet(&self, label: Option<&str>) -> Result<WalletKeys> {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let keys = self.derive_keys(&hex::encode(seed));
        self.register(keys, label)
    }

    fn import_wallet(&self, seed_phrase: &str, label: Option<&str>) -> Result<WalletKeys> {
        let seed_phrase = seed_phrase.trim();
        if seed_phrase.is_empty() {
            return Err(Error::validation("Seed phrase is required"));
        }
        let keys = self.derive_keys(seed_phrase);
        self.register(keys, label)
    }

    fn balance(&self, wallet_id: &str) -> Result<WalletBalance> {
        self.store
            .read(|state| state.wallets.get(wallet_id).map(SimWallet::balance))?
            .ok_or_else(|| Error::not_found(format!("Wallet {}", wallet_id)))
    }

    fn send(
        &self,
        from_wallet_id: &str,
        to_address: &str,
        amount_zatoshi: i64,
        memo: Option<&str>,
    ) -> Result<SentTransaction> {
        if amount_zatoshi <= 0 {
            return Err(Error::validation("Send amount must be positive"));
        }
        let fee = self.fee;

        self.store.update(|state| {
            let sender = state
                .wallets
                .get_mut(from_wallet_id)
                .ok_or_else(|| Error::not_found(format!("Wallet {}", from_wallet_id)))?;

            let needed = amount_zatoshi + fee;
            let available = sender.transparent + sender.shielded;
            if available < needed {
                return Err(Error::InsufficientBalance { needed, available });
            }

            // Spend shielded notes first
            let from_shielded = needed.min(sender.shielded);
            sender.shielded -= from_shielded;
            sender.transparent -= needed - from_shielded;
            let from_address = if from_shielded > 0 {
                sender.shielded_address.clone()
            } else {
                sender.transparent_address.clone()
            };

            if let Some(recipient) = state.wallets.values_mut().find(|w| w.owns(to_address)) {
                if recipient.shielded_address == to_address {
                    recipient.shielded += amount_zatoshi;
                } else {
                    recipient.transparent += amount_zatoshi;
                }
            }

            let mut hasher = Sha256::new();
            hasher.update(from_address.as_bytes());
            hasher.update(to_address.as_bytes());
            hasher.update(amount_zatoshi.to_le_bytes());
            hasher.update((state.transactions.len() as u64).to_le_bytes());
            hasher.update(state.tip_height.to_le_bytes());
            let tx_id = hex::encode(hasher.finalize());

            state.transactions.insert(
                tx_id.clone(),
                SimTransaction {
                    tx_id: tx_id.clone(),
                    from_address: from_address.clone(),
                    to_address: to_address.to_string(),
                    amount: amount_zatoshi,
                    fee,
                    memo: memo.map(str::to_string),
                    mined_height: None,
                    created_at: Utc::now(),
                },
            );

            Ok(SentTransaction {
                tx_id,
                from_address,
            })
        })
    }

    fn transaction_status(&self, tx_id: &str) -> Result<Option<TxConfirmation>> {
        self.store.read(|state| {
            state.transactions.get(tx_id).map(|tx| match tx.mined_height {
                Some(height) => TxConfirmation {
                    confirmations: (state.tip_height - height + 1) as u32,
                    block_height: Some(height),
                },
                None => TxConfirmation {
                    confirmations: 0,
                    block_height: None,
                },
            })
        })
    }

    fn sync(&self) -> Result<u64> {
        self.mine_blocks(1)
    }

    fn fee_zatoshi(&self) -> i64 {
        self.fee
    }

    fn faucet(&self, wallet_id: &str, amount_zatoshi: i64, pool: Pool) -> Result<()> {
        if amount_zatoshi <= 0 {
            return Err(Error::validation("Faucet amount must be positive"));
        }
        self.store.update(|state| {
            let wallet = state
                .wallets
                .get_mut(wallet_id)
                .ok_or_else(|| Error::not_found(format!("Wallet {}", wallet_id)))?;
            match pool {
                Pool::Shielded => wallet.shielded += amount_zatoshi,
                Pool::Transparent => wallet.transparent += amount_zatoshi,
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_is_deterministic() {
        let chain = SimulatedZcash::in_memory(Network::Testnet);
        let a = chain.import_wallet("correct horse battery staple", None).unwrap();
        let b = chain.import_wallet("correct horse battery staple", Some("again")).unwrap();
        assert_eq!(a, b);
        assert!(a.shielded_address.starts_with("ztestsapling1"));
        assert!(a.transparent_address.starts_with("tm"));
    }

    #[test]
    fn test_mainnet_prefixes() {
        let chain = SimulatedZcash::in_memory(Network::Mainnet);
        let keys = chain.create_wallet(Some("main")).unwrap();
        assert!(keys.shielded_address.starts_with("zs1"));
        assert!(keys.transparent_address.starts_with("t1"));
    }

    #[test]
    fn test_send_moves_funds_and_charges_fee() {
        let chain = SimulatedZcash::in_memory(Network::Testnet);
        let alice = chain.create_wallet(None).unwrap();
        let bob = chain.create_wallet(None).unwrap();
        chain.faucet(&alice.wallet_id, 10_000, Pool::Shielded).unwrap();

        chain.send(&alice.wallet_id, &bob.shielded_address, 4_000, None).unwrap();

        assert_eq!(chain.balance(&alice.wallet_id).unwrap().total(), 5_000);
        assert_eq!(chain.balance(&bob.wallet_id).unwrap().shielded, 4_000);
    }

    #[test]
    fn test_send_spends_shielded_before_transparent() {
        let chain = SimulatedZcash::in_memory(Network::Testnet);
        let alice = chain.create_wallet(None).unwrap();
        let bob = chain.create_wallet(None).unwrap();
        chain.faucet(&alice.wallet_id, 2_000, Pool::Shielded).unwrap();
        chain.faucet(&alice.wallet_id, 5_000, Pool::Transparent).unwrap();

        chain.send(&alice.wallet_id, &bob.transparent_address, 3_000, None).unwrap();

        let balance = chain.balance(&alice.wallet_id).unwrap();
        assert_eq!(balance.shielded, 0);
        assert_eq!(balance.transparent, 3_000);
        assert_eq!(chain.balance(&bob.wallet_id).unwrap().transparent, 3_000);
    }

    #[test]
    fn test_insufficient_funds_leaves_balance_untouched() {
        let chain = SimulatedZcash::in_memory(Network::Testnet);
        let alice = chain.create_wallet(None).unwrap();
        chain.faucet(&alice.wallet_id, 1_500, Pool::Shielded).unwrap();

        let err = chain.send(&alice.wallet_id, "ztestsapling1dead", 1_000, None).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { needed: 2_000, available: 1_500 }));
        assert_eq!(chain.balance(&alice.wallet_id).unwrap().total(), 1_500);
    }

    #[test]
    fn test_confirmations_grow_with_blocks() {
        let chain = SimulatedZcash::in_memory(Network::Testnet);
        let alice = chain.create_wallet(None).unwrap();
        chain.faucet(&alice.wallet_id, 50_000, Pool::Shielded).unwrap();
        let sent = chain.send(&alice.wallet_id, "ztestsapling1elsewhere", 10_000, None).unwrap();

        let status = chain.transaction_status(&sent.tx_id).unwrap().unwrap();
        assert_eq!(status.confirmations, 0);

        chain.sync().unwrap();
        let status = chain.transaction_status(&sent.tx_id).unwrap().unwrap();
        assert_eq!(status.confirmations, 1);

        chain.mine_blocks(5).unwrap();
        let status = chain.transaction_status(&sent.tx_id).unwrap().unwrap();
        assert_eq!(status.confirmations, 6);
        assert_eq!(status.block_height, Some(1));

        assert!(chain.transaction_status("unknown").unwrap().is_none());
    }
}
