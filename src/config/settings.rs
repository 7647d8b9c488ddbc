use crate::core::params::{
    DEFAULT_BLOCK_REWARD, DEFAULT_DIFFICULTY, DEFAULT_GENESIS_ADDRESS, DEFAULT_GENESIS_ALLOCATION,
    DEFAULT_MAX_BLOCK_TRANSACTIONS, DEFAULT_MAX_MINING_ATTEMPTS, MAX_DIFFICULTY,
};
use crate::error::{BlockchainError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const HOST_KEY: &str = "LEDGER_HOST";
const PORT_KEY: &str = "LEDGER_PORT";
const NODE_ID_KEY: &str = "LEDGER_NODE_ID";
const BOOTSTRAP_KEY: &str = "LEDGER_BOOTSTRAP";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";

pub const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sled,
}

/// Node configuration: defaults, then an optional TOML file, then environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_id: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub bootstrap_nodes: Vec<String>,
    pub peer_timeout_secs: u64,
    pub maintenance_interval_secs: u64,
    pub difficulty: u32,
    pub block_reward: u64,
    pub genesis_address: String,
    pub genesis_allocation: u64,
    pub max_block_transactions: usize,
    pub mining_interval_secs: u64,
    pub max_mining_attempts: u64,
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    pub snapshot_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: generate_node_id(),
            version: PROTOCOL_VERSION.to_string(),
            host: "0.0.0.0".to_string(),
            port: 30303,
            bootstrap_nodes: Vec::new(),
            peer_timeout_secs: 30,
            maintenance_interval_secs: 60,
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: DEFAULT_BLOCK_REWARD,
            genesis_address: DEFAULT_GENESIS_ADDRESS.to_string(),
            genesis_allocation: DEFAULT_GENESIS_ALLOCATION,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
            mining_interval_secs: 10,
            max_mining_attempts: DEFAULT_MAX_MINING_ATTEMPTS,
            data_dir: PathBuf::from("./data"),
            storage_backend: StorageBackend::Json,
            snapshot_interval_secs: 300,
        }
    }
}

impl Config {
    /// Load from `path` when given, then apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                info!("Loading configuration from {}", path.display());
                Self::from_toml(&text)?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = env::var(HOST_KEY) {
            self.host = host;
        }
        if let Ok(port) = env::var(PORT_KEY) {
            self.port = port
                .parse()
                .map_err(|e| BlockchainError::Config(format!("Invalid {PORT_KEY}: {e}")))?;
        }
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            self.node_id = node_id;
        }
        if let Ok(bootstrap) = env::var(BOOTSTRAP_KEY) {
            self.bootstrap_nodes = bootstrap
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(data_dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(difficulty) = env::var(DIFFICULTY_KEY) {
            self.difficulty = difficulty
                .parse()
                .map_err(|e| BlockchainError::Config(format!("Invalid {DIFFICULTY_KEY}: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(BlockchainError::Config("node_id must not be empty".to_string()));
        }
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if self.max_block_transactions == 0 {
            return Err(BlockchainError::Config(
                "max_block_transactions must be positive".to_string(),
            ));
        }
        if self.peer_timeout_secs == 0 || self.mining_interval_secs == 0 {
            return Err(BlockchainError::Config(
                "intervals and timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn mining_interval(&self) -> Duration {
        Duration::from_secs(self.mining_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

fn generate_node_id() -> String {
    format!("node_{}", uuid::Uuid::new_v4().simple())
}
