//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "network": "testnet",
//!   "api": { "bind": "127.0.0.1", "port": 3001 },
//!   "monitor": { "updateIntervalMs": 60000, "confirmationBlocks": 6, "failureTimeoutSecs": 3600 },
//!   "escrow": { "adminIds": ["admin"], "allowFaucet": true, "nearOwnerAccount": "zescrow.testnet" }
//! }
//! ```
//! Every field is optional. Environment variables override the file so
//! deployments can tweak a single value without editing JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Network;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

/// Reconciliation loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub update_interval_ms: u64,
    /// Depth at which a Zcash transaction counts as final
    pub confirmation_blocks: u32,
    /// Pending transactions the chain has never seen are failed after this long
    pub failure_timeout_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 60_000,
            confirmation_blocks: 6,
            failure_timeout_secs: 3_600,
        }
    }
}

impl MonitorSettings {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    pub fn failure_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.failure_timeout_secs as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EscrowSettings {
    /// Users allowed to resolve disputes
    pub admin_ids: Vec<String>,
    pub max_deadline_days: u32,
    pub allow_faucet: bool,
    pub near_owner_account: String,
    /// Seed of the Zcash wallet holding escrowed funds
    pub vault_seed: String,
}

impl Default for EscrowSettings {
    fn default() -> Self {
        Self {
            admin_ids: vec!["admin".to_string()],
            max_deadline_days: 365,
            allow_faucet: true,
            near_owner_account: "zescrow.testnet".to_string(),
            vault_seed: "zescrow-vault".to_string(),
        }
    }
}

impl EscrowSettings {
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.iter().any(|a| a == user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub network: Network,
    pub api: ApiSettings,
    pub monitor: MonitorSettings,
    pub escrow: EscrowSettings,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "TRUE" | "YES" => Some(true),
        "false" | "0" | "no" | "FALSE" | "NO" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load `settings.json` from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join("settings.json");
        if !settings_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&settings_path)
            .with_context(|| format!("Failed to read {}", settings_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", settings_path.display()))
    }

    /// Apply overrides from a key lookup (the process environment in practice)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(network) = lookup("ZESCROW_NETWORK") {
            self.network = network.parse()?;
        }
        if let Some(bind) = lookup("ZESCROW_API_BIND") {
            self.api.bind = bind;
        }
        if let Some(port) = lookup("ZESCROW_API_PORT") {
            self.api.port = port
                .parse()
                .with_context(|| format!("ZESCROW_API_PORT is not a port: {}", port))?;
        }
        if let Some(interval) = lookup("ZCASH_UPDATE_INTERVAL") {
            self.monitor.update_interval_ms = interval
                .parse()
                .with_context(|| format!("ZCASH_UPDATE_INTERVAL is not a number: {}", interval))?;
        }
        if let Some(blocks) = lookup("ZCASH_CONFIRMATION_BLOCKS") {
            self.monitor.confirmation_blocks = blocks
                .parse()
                .with_context(|| format!("ZCASH_CONFIRMATION_BLOCKS is not a number: {}", blocks))?;
        }
        if let Some(admins) = lookup("ZESCROW_ADMIN_IDS") {
            self.escrow.admin_ids = admins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(flag) = lookup("ZESCROW_ALLOW_FAUCET").as_deref().and_then(parse_flag) {
            self.escrow.allow_faucet = flag;
        }
        Ok(())
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_file(dir.path()).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.monitor.update_interval_ms, 60_000);
        assert_eq!(config.monitor.confirmation_blocks, 6);
        assert_eq!(config.api.port, 3001);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "network": "mainnet", "monitor": { "confirmationBlocks": 10 } }"#,
        )
        .unwrap();

        let config = Config::load_file(dir.path()).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.monitor.confirmation_blocks, 10);
        assert_eq!(config.monitor.update_interval_ms, 60_000);
        assert!(config.escrow.is_admin("admin"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ZCASH_UPDATE_INTERVAL", "5000"),
            ("ZCASH_CONFIRMATION_BLOCKS", "3"),
            ("ZESCROW_ADMIN_IDS", "ops1, ops2,"),
            ("ZESCROW_ALLOW_FAUCET", "no"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.monitor.update_interval_ms, 5_000);
        assert_eq!(config.monitor.confirmation_blocks, 3);
        assert_eq!(config.escrow.admin_ids, vec!["ops1", "ops2"]);
        assert!(!config.escrow.allow_faucet);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "ZESCROW_API_PORT").then(|| "eighty".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.api.port = 9999;
        config.save(dir.path()).unwrap();

        let loaded = Config::load_file(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
