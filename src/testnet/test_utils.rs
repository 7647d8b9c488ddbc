//! Test utilities for chain testing

use crate::core::{Block, Blockchain, ChainParams, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::JsonFileStore;
use crate::wallet::Wallet;
use std::sync::Arc;
use tempfile::TempDir;

/// Difficulty low enough that a block is found in a few hundred attempts
pub const TEST_DIFFICULTY: u32 = 1;

pub const TEST_MAX_ATTEMPTS: u64 = 10_000_000;

/// Default params with an easy difficulty
pub fn test_params() -> ChainParams {
    ChainParams::default().with_difficulty(TEST_DIFFICULTY)
}

/// A transaction signed by a fresh key pair
pub fn signed_transaction(from: &str, to: &str, amount: u64, fee: u64) -> Transaction {
    let wallet = Wallet::new().expect("key generation");
    let mut tx = Transaction::new(from, to, amount, fee, 0).expect("timestamp");
    wallet.sign_transaction(&mut tx).expect("signing");
    tx
}

/// Build a candidate from the pool, solve it and commit it
pub fn mine_next_block(blockchain: &Blockchain, miner: &str) -> Result<Block> {
    let candidate = blockchain.build_candidate_block(miner)?;
    let block = ProofOfWork::solve(candidate, blockchain.params().difficulty, TEST_MAX_ATTEMPTS)?;
    blockchain.append_block(block.clone())?;
    Ok(block)
}

pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// A chain persisted to a JSON store in a throwaway directory
pub fn create_test_blockchain() -> Result<(Blockchain, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let store = Arc::new(JsonFileStore::new(temp_dir.path())?);
    let blockchain = Blockchain::with_store(test_params(), store);
    Ok((blockchain, temp_dir))
}
