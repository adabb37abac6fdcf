//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod amount;
mod deal;
pub mod identity;
mod intent;
mod network;
pub mod result;
mod transaction;
mod wallet;

pub use deal::{Deal, DealStatus, DealUpdate, Party, Resolution};
pub use intent::{EscrowIntent, IntentStatus};
pub use network::Network;
pub use transaction::{Blockchain, ChainTransaction, SyncState, TxStatus, TxType};
pub use wallet::{Pool, Wallet, WalletBalance, WalletKeys};
