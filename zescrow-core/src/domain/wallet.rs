//! User wallets

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::zatoshi_to_zec;

/// A user's Zcash wallet as known to the escrow store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub wallet_id: String,
    pub user_id: String,
    pub label: Option<String>,
    pub transparent_address: String,
    pub shielded_address: String,
    pub created_at: DateTime<Utc>,
}

/// Addresses handed back by the chain when a wallet is created or imported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletKeys {
    pub wallet_id: String,
    pub transparent_address: String,
    pub shielded_address: String,
}

/// Spendable balance split by pool, in zatoshi
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub transparent: i64,
    pub shielded: i64,
}

impl WalletBalance {
    pub fn total(&self) -> i64 {
        self.transparent + self.shielded
    }

    pub fn total_zec(&self) -> Decimal {
        zatoshi_to_zec(self.total())
    }
}

/// Which pool a deposit lands in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Transparent,
    #[default]
    Shielded,
}
