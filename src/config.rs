// Layered runtime configuration: built-in defaults, then a TOML file, then
// STORYMINT_* environment variables (`__` separates nested keys).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "storymint.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    pub data_dir: String,
    pub log_level: String,
    /// Query the ledger for paid-but-unrecorded chapters whenever purchases are loaded.
    #[serde(default)]
    pub reconcile_on_load: bool,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub expected_chain_id: Option<u64>,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: String::new(),
            expected_chain_id: None,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            data_dir: "storymint_data".to_string(),
            log_level: "info".to_string(),
            reconcile_on_load: false,
            wallet: WalletConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl MarketConfig {
    /// The wallet is only usable once a contract address is configured.
    pub fn wallet_enabled(&self) -> bool {
        !self.wallet.contract_address.trim().is_empty()
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.data_dir.trim().is_empty() {
            return Err(figment::Error::from("data_dir cannot be empty".to_string()));
        }
        if self.wallet_enabled() && !is_hex_address(&self.wallet.contract_address) {
            return Err(figment::Error::from(format!(
                "wallet.contract_address '{}' is not a 0x-prefixed 20-byte hex address",
                self.wallet.contract_address
            )));
        }
        if self.wallet.poll_interval_ms == 0 {
            return Err(figment::Error::from(
                "wallet.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.wallet.confirmation_timeout_secs == 0 {
            return Err(figment::Error::from(
                "wallet.confirmation_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_hex_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

pub fn load_config(path: Option<&str>) -> Result<MarketConfig, figment::Error> {
    let figment = Figment::from(Serialized::defaults(MarketConfig::default()))
        .merge(Toml::file(path.unwrap_or(DEFAULT_CONFIG_FILE)))
        .merge(Env::prefixed("STORYMINT_").split("__"));

    let config: MarketConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
