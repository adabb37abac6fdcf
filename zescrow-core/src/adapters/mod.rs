//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for deal, transaction and wallet persistence
//! - Simulated Zcash ledger for ZcashChain
//! - Simulated NEAR contract for IntentRegistry
//! - Simulated EVM vault for VaultContract
//!
//! The simulated backends persist to JSON files so separate processes
//! share one view of the chains.

pub mod duckdb;
pub mod near_sim;
pub mod state_file;
pub mod vault_sim;
pub mod zcash_sim;
