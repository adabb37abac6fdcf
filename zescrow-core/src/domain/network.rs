use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Which network the chains run on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Sapling shielded address prefix
    pub fn shielded_prefix(&self) -> &'static str {
        match self {
            Network::Testnet => "ztestsapling1",
            Network::Mainnet => "zs1",
        }
    }

    /// Transparent P2PKH address prefix
    pub fn transparent_prefix(&self) -> &'static str {
        match self {
            Network::Testnet => "tm",
            Network::Mainnet => "t1",
        }
    }

    /// Top-level NEAR account suffix
    pub fn near_suffix(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "near",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "testnet" | "test" => Ok(Network::Testnet),
            "mainnet" | "main" => Ok(Network::Mainnet),
            other => Err(Error::validation(format!("Unknown network: {}", other))),
        }
    }
}
