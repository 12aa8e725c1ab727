/*!
Configuration management for the backend, the admin commands and the watcher
*/

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use trustvote_chain::{
    Address, ContractSettings, RpcVotingContract, address::checksummed, parse_address, parse_signer,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid {key} value {value:?}: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Chain(#[from] trustvote_chain::ChainError),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Node and contract settings
    pub chain: ChainConfig,
    /// Login backend settings
    pub server: ServerConfig,
    /// Live results watcher settings
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the node
    pub rpc_url: String,
    /// Address of the deployed `VotingSystem` contract
    #[serde(with = "checksummed::option", default)]
    pub contract_address: Option<Address>,
    /// Hex private key used for writes and funding
    pub private_key: Option<String>,
    /// Looked up from the node when unset
    pub chain_id: Option<u64>,
    /// First block scanned for events, usually the deployment block
    pub from_block: u64,
    /// Maximum block span per `eth_getLogs` request
    pub log_chunk_size: Option<u64>,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite file holding wallet records
    pub database_path: PathBuf,
    /// Ether sent to each wallet on login, as a decimal string
    pub fund_amount_ether: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    /// Output configuration
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output plugin type
    pub plugin: OutputPlugin,
    /// Whether this output is enabled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OutputPlugin {
    /// One compact JSON object per line
    Json { path: PathBuf },
    Webhook { url: String, auth_token: Option<String> },
    Terminal { format: TerminalFormat },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum TerminalFormat {
    Plain,
    Colored,
    Json,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: None,
            private_key: None,
            chain_id: None,
            from_block: 0,
            log_chunk_size: None,
            receipt_timeout_secs: 120,
            receipt_poll_interval_ms: 2000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            database_path: PathBuf::from("./trustvote.db"),
            fund_amount_ether: "0.05".to_string(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            outputs: vec![OutputConfig {
                plugin: OutputPlugin::Terminal {
                    format: TerminalFormat::Colored,
                },
                enabled: true,
            }],
        }
    }
}

impl AppConfig {
    /// `$CONFIG_DIR/trustvote/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("trustvote").join("config.toml"))
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path`, or the default location when `None`. A missing default
    /// file yields the built-in defaults; a missing explicit file is an error.
    /// Environment variables are applied on top.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path).await?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path).await?,
                _ => {
                    info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    async fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Loaded config from {:?}", path);
        Self::from_toml(&content, path)
    }

    /// Overrides settings from `RPC_URL`, `VOTING_SYSTEM_ADDRESS`,
    /// `FUNDING_WALLET_PRIVATE_KEY`, `PORT` and `DATABASE_PATH`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(address) = lookup("VOTING_SYSTEM_ADDRESS") {
            let address = parse_env("VOTING_SYSTEM_ADDRESS", address, parse_address)?;
            self.chain.contract_address = Some(address);
        }
        if let Some(key) = lookup("FUNDING_WALLET_PRIVATE_KEY") {
            self.chain.private_key = Some(key);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", port, str::parse)?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.server.database_path = PathBuf::from(path);
        }
        Ok(())
    }
}

fn parse_env<T, E: Display>(
    key: &'static str,
    value: String,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<T, ConfigError> {
    let parsed = parse(value.trim());
    parsed.map_err(|e| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Env {
            key,
            reason: e.to_string(),
            value,
        }
    })
}

impl ChainConfig {
    pub fn contract_settings(&self) -> Result<ContractSettings, ConfigError> {
        let address = self
            .contract_address
            .ok_or(ConfigError::Missing("chain.contract_address / VOTING_SYSTEM_ADDRESS"))?;
        Ok(ContractSettings {
            from_block: self.from_block,
            log_chunk_size: self.log_chunk_size,
            chain_id: self.chain_id,
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            ..ContractSettings::new(address)
        })
    }

    /// Read-only binding
    pub fn reader(&self) -> Result<RpcVotingContract, ConfigError> {
        Ok(RpcVotingContract::connect(&self.rpc_url, self.contract_settings()?)?)
    }

    /// Binding that signs with the configured private key
    pub fn writer(&self) -> Result<RpcVotingContract, ConfigError> {
        let key = self
            .private_key
            .as_deref()
            .ok_or(ConfigError::Missing("chain.private_key / FUNDING_WALLET_PRIVATE_KEY"))?;
        let signer = parse_signer(key)?;
        info!("Signing as {}", signer.address());
        Ok(self.reader()?.with_signer(signer))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [chain]
            rpc_url = "http://node:8545"
            contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            from_block = 12

            [server]
            port = 8080
            "#,
            Path::new("config.toml"),
        )
        .unwrap();

        assert_eq!(config.chain.rpc_url, "http://node:8545");
        assert_eq!(config.chain.from_block, 12);
        assert_eq!(config.chain.receipt_timeout_secs, 120);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.fund_amount_ether, "0.05");
        assert_eq!(config.watch.outputs.len(), 1);
    }

    #[test]
    fn parses_output_plugins() {
        let config = AppConfig::from_toml(
            r#"
            [[watch.outputs]]
            plugin = { Json = { path = "votes.jsonl" } }

            [[watch.outputs]]
            plugin = { Terminal = { format = "Plain" } }
            enabled = false
            "#,
            Path::new("config.toml"),
        )
        .unwrap();

        assert_eq!(config.watch.outputs.len(), 2);
        assert!(config.watch.outputs[0].enabled);
        assert_eq!(
            config.watch.outputs[0].plugin,
            OutputPlugin::Json {
                path: PathBuf::from("votes.jsonl")
            }
        );
        assert_eq!(
            config.watch.outputs[1].plugin,
            OutputPlugin::Terminal {
                format: TerminalFormat::Plain
            }
        );
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("RPC_URL", "http://ganache:7545"),
                ("VOTING_SYSTEM_ADDRESS", "0x5fbdb2315678afecb367f032d93f642f64180aa3"),
                ("PORT", "3001"),
                ("DATABASE_PATH", "/data/wallets.db"),
            ]))
            .unwrap();

        assert_eq!(config.chain.rpc_url, "http://ganache:7545");
        assert_eq!(
            config.chain.contract_address.unwrap().to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.database_path, PathBuf::from("/data/wallets.db"));
    }

    #[test]
    fn bad_environment_value_is_reported() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "PORT", .. }));

        let bad_checksum = "0x5fbdb2315678afecb367f032d93F642f64180aa3";
        let err = config
            .apply_env(env(&[("VOTING_SYSTEM_ADDRESS", bad_checksum)]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "VOTING_SYSTEM_ADDRESS", .. }));
    }

    #[test]
    fn file_address_is_checksum_validated() {
        let result = AppConfig::from_toml(
            r#"
            [chain]
            contract_address = "0x5fbdb2315678afecb367f032d93F642f64180aa3"
            "#,
            Path::new("config.toml"),
        );
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn writer_needs_a_valid_key() {
        let chain = ChainConfig {
            contract_address: Some(Address::repeat_byte(7)),
            ..ChainConfig::default()
        };
        assert!(matches!(chain.writer(), Err(ConfigError::Missing(_))));

        let chain = ChainConfig {
            private_key: Some("zz".into()),
            ..chain
        };
        assert!(matches!(
            chain.writer(),
            Err(ConfigError::Chain(trustvote_chain::ChainError::InvalidKey))
        ));
    }

    #[test]
    fn contract_address_is_required() {
        let err = ChainConfig::default().contract_settings().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn settings_follow_config() {
        let chain = ChainConfig {
            contract_address: Some(Address::repeat_byte(7)),
            chain_id: Some(1337),
            log_chunk_size: Some(5000),
            receipt_timeout_secs: 30,
            ..ChainConfig::default()
        };
        let settings = chain.contract_settings().unwrap();
        assert_eq!(settings.chain_id, Some(1337));
        assert_eq!(settings.log_chunk_size, Some(5000));
        assert_eq!(settings.receipt_timeout, Duration::from_secs(30));
    }
}
