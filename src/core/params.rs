//! Chain parameters and protocol constants
//!
//! Values here are consensus-relevant: two nodes only converge when they agree
//! on the genesis allocation, the difficulty and the block reward.

use crate::config::Config;

/// Version stamped into every new block header
pub const BLOCK_VERSION: u32 = 1;

/// Version stamped into every new transaction
pub const TRANSACTION_VERSION: u32 = 1;

/// `prev_hash` of the genesis block
pub const GENESIS_PREV_HASH: &str = "0";

/// Sender recorded on the genesis allocation transaction
pub const GENESIS_SENDER: &str = "0";

/// Miner recorded on the genesis block
pub const GENESIS_MINER: &str = "genesis_miner";

/// 2024-01-01T00:00:00Z, fixed so every node derives the same genesis hash
pub const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

pub const DEFAULT_GENESIS_ADDRESS: &str = "genesis_address";
pub const DEFAULT_GENESIS_ALLOCATION: u64 = 1_000_000;
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_BLOCK_REWARD: u64 = 50;

/// Pool entries drained into one candidate block
pub const DEFAULT_MAX_BLOCK_TRANSACTIONS: usize = 100;

/// Hard cap enforced when validating any block, local or remote
pub const MAX_BLOCK_TRANSACTIONS: usize = 1000;

/// Nonces tried before a mining attempt gives up
pub const DEFAULT_MAX_MINING_ATTEMPTS: u64 = 100_000_000;

/// Largest meaningful difficulty: a SHA-256 hex digest has 64 nibbles
pub const MAX_DIFFICULTY: u32 = 64;

/// Blocks stamped further than this into the future are rejected
pub const MAX_FUTURE_DRIFT_SECS: i64 = 2 * 60 * 60;

/// The consensus-relevant subset of the node configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub difficulty: u32,
    pub block_reward: u64,
    pub genesis_address: String,
    pub genesis_allocation: u64,
    pub max_block_transactions: usize,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: DEFAULT_BLOCK_REWARD,
            genesis_address: DEFAULT_GENESIS_ADDRESS.to_string(),
            genesis_allocation: DEFAULT_GENESIS_ALLOCATION,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }
}

impl ChainParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            difficulty: config.difficulty,
            block_reward: config.block_reward,
            genesis_address: config.genesis_address.clone(),
            genesis_allocation: config.genesis_allocation,
            max_block_transactions: config.max_block_transactions,
        }
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_block_reward(mut self, block_reward: u64) -> Self {
        self.block_reward = block_reward;
        self
    }
}
