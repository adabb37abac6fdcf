//! On-chain transaction records tracked against deals

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Zcash,
    Ethereum,
}

impl Blockchain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::Zcash => "zcash",
            Blockchain::Ethereum => "ethereum",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zcash" => Ok(Blockchain::Zcash),
            "ethereum" => Ok(Blockchain::Ethereum),
            other => Err(Error::validation(format!("Unknown blockchain: {}", other))),
        }
    }
}

/// Purpose of a transfer within a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    /// Client funds moved into the vault
    Escrow,
    /// Vault pays the freelancer
    Release,
    /// Vault returns funds to the client
    Refund,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Escrow => "escrow",
            TxType::Release => "release",
            TxType::Refund => "refund",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "escrow" => Ok(TxType::Escrow),
            "release" => Ok(TxType::Release),
            "refund" => Ok(TxType::Refund),
            other => Err(Error::validation(format!("Unknown transaction type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "confirmed" => Ok(TxStatus::Confirmed),
            "failed" => Ok(TxStatus::Failed),
            other => Err(Error::validation(format!("Unknown transaction status: {}", other))),
        }
    }
}

/// A transfer recorded against a deal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub tx_id: String,
    pub deal_id: String,
    pub blockchain: Blockchain,
    pub tx_type: TxType,
    pub from_address: String,
    pub to_address: String,
    pub amount_zatoshi: i64,
    pub status: TxStatus,
    pub confirmations: u32,
    pub block_height: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainTransaction {
    /// A freshly broadcast transaction with no confirmations
    pub fn pending(
        tx_id: impl Into<String>,
        deal_id: impl Into<String>,
        blockchain: Blockchain,
        tx_type: TxType,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        amount_zatoshi: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            tx_id: tx_id.into(),
            deal_id: deal_id.into(),
            blockchain,
            tx_type,
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount_zatoshi,
            status: TxStatus::Pending,
            confirmations: 0,
            block_height: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as already final (used for EVM authorization receipts)
    pub fn confirmed(mut self) -> Self {
        self.status = TxStatus::Confirmed;
        self.confirmations = 1;
        self
    }
}

/// Last block height the monitor observed for a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub blockchain: Blockchain,
    pub last_block_height: u64,
    pub last_sync_time: DateTime<Utc>,
}
