//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod chain;

pub use chain::{
    IntentRegistry, PayoutAuthorization, SentTransaction, TxConfirmation, VaultContract,
    ZcashChain,
};
