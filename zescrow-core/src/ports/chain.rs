//! Chain ports
//!
//! The escrow engine talks to three external systems: a Zcash wallet
//! backend that moves funds, a NEAR contract that mirrors each deal as an
//! intent, and an EVM vault contract that authorizes payouts. Adapters
//! implement these traits; services only ever see the traits.

use serde::{Deserialize, Serialize};

use crate::domain::amount::DEFAULT_FEE_ZATOSHI;
use crate::domain::result::{Error, Result};
use crate::domain::{EscrowIntent, Network, Pool, TxType, WalletBalance, WalletKeys};

/// A broadcast Zcash transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentTransaction {
    pub tx_id: String,
    pub from_address: String,
}

/// Confirmation depth of a known transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfirmation {
    pub confirmations: u32,
    pub block_height: Option<u64>,
}

/// Zcash wallet backend
pub trait ZcashChain: Send + Sync {
    fn network(&self) -> Network;

    fn create_wallet(&self, label: Option<&str>) -> Result<WalletKeys>;

    /// Importing the same seed twice yields the same wallet
    fn import_wallet(&self, seed_phrase: &str, label: Option<&str>) -> Result<WalletKeys>;

    fn balance(&self, wallet_id: &str) -> Result<WalletBalance>;

    /// Send `amount_zatoshi` to `to_address`; the fee is charged on top.
    fn send(
        &self,
        from_wallet_id: &str,
        to_address: &str,
        amount_zatoshi: i64,
        memo: Option<&str>,
    ) -> Result<SentTransaction>;

    /// `None` when the chain has never seen the transaction
    fn transaction_status(&self, tx_id: &str) -> Result<Option<TxConfirmation>>;

    /// Catch up with the chain and return the tip height
    fn sync(&self) -> Result<u64>;

    fn fee_zatoshi(&self) -> i64 {
        DEFAULT_FEE_ZATOSHI
    }

    /// Development faucet; real backends don't mint coins
    fn faucet(&self, _wallet_id: &str, _amount_zatoshi: i64, _pool: Pool) -> Result<()> {
        Err(Error::chain("Faucet is not available on this backend"))
    }
}

/// NEAR escrow intent contract
pub trait IntentRegistry: Send + Sync {
    /// Account allowed to resolve disputes
    fn owner_account(&self) -> String;

    fn create_intent(&self, intent: EscrowIntent) -> Result<EscrowIntent>;

    fn submit_work(&self, intent_id: &str, caller: &str, proof_link: &str) -> Result<()>;

    fn approve(&self, intent_id: &str, caller: &str) -> Result<()>;

    fn dispute(&self, intent_id: &str, caller: &str) -> Result<()>;

    fn cancel(&self, intent_id: &str, caller: &str) -> Result<()>;

    fn resolve(&self, intent_id: &str, caller: &str, complete: bool) -> Result<()>;

    fn get_intent(&self, intent_id: &str) -> Result<Option<EscrowIntent>>;

    fn user_intents(&self, account_id: &str) -> Result<Vec<EscrowIntent>>;

    fn total_intents(&self) -> Result<u64>;
}

/// A payout the vault contract is asked to sign off on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAuthorization {
    pub deal_id: String,
    pub intent_id: String,
    pub kind: TxType,
    pub recipient: String,
    pub amount_zatoshi: i64,
}

/// EVM vault contract guarding escrowed funds
pub trait VaultContract: Send + Sync {
    fn contract_address(&self) -> String;

    /// Zcash wallet that holds escrowed funds
    fn vault_wallet(&self) -> WalletKeys;

    /// Record the payout on the contract and return the EVM transaction hash.
    /// A deal has at most one payout kind; authorizing the same kind again
    /// returns the recorded hash.
    fn authorize_payout(&self, payout: &PayoutAuthorization) -> Result<String>;
}
