use crate::core::params::{
    BLOCK_VERSION, GENESIS_MINER, GENESIS_PREV_HASH, GENESIS_TIMESTAMP,
};
use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{current_timestamp, sha256_hex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    version: u32,
    index: u64,
    timestamp: i64,
    prev_hash: String,
    merkle_root: String,
    transactions: Vec<Transaction>,
    nonce: u64,
    difficulty: u32,
    hash: String,
    miner: String,
    block_reward: u64,
}

impl Block {
    /// Build an unsolved candidate. The hash is filled in for nonce 0 and has to
    /// be replaced by the proof-of-work result before the block is committed.
    pub fn new_block(
        index: u64,
        transactions: Vec<Transaction>,
        prev_hash: String,
        difficulty: u32,
        miner: &str,
        block_reward: u64,
    ) -> Result<Block> {
        Ok(Self::assemble(
            index,
            current_timestamp()?,
            transactions,
            prev_hash,
            difficulty,
            miner,
            block_reward,
        ))
    }

    fn assemble(
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        prev_hash: String,
        difficulty: u32,
        miner: &str,
        block_reward: u64,
    ) -> Block {
        let merkle_root = Self::calculate_merkle_root(&transactions);
        let mut block = Block {
            version: BLOCK_VERSION,
            index,
            timestamp,
            prev_hash,
            merkle_root,
            transactions,
            nonce: 0,
            difficulty,
            hash: String::new(),
            miner: miner.to_string(),
            block_reward,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The fixed first block. Its hash is not required to meet any difficulty.
    pub fn genesis(genesis_address: &str, allocation: u64, difficulty: u32) -> Block {
        let transactions = vec![Transaction::genesis(genesis_address, allocation)];
        Self::assemble(
            0,
            GENESIS_TIMESTAMP,
            transactions,
            GENESIS_PREV_HASH.to_string(),
            difficulty,
            GENESIS_MINER,
            0,
        )
    }

    pub fn calculate_hash(&self) -> String {
        self.calculate_hash_with_nonce(self.nonce)
    }

    /// Digest over every header field except `hash`. Transactions are covered
    /// through the merkle root.
    pub fn calculate_hash_with_nonce(&self, nonce: u64) -> String {
        let header = serde_json::json!({
            "version": self.version,
            "index": self.index,
            "timestamp": self.timestamp,
            "prev_hash": self.prev_hash,
            "merkle_root": self.merkle_root,
            "nonce": nonce,
            "difficulty": self.difficulty,
            "miner": self.miner,
            "block_reward": self.block_reward,
        });
        sha256_hex(header.to_string().as_bytes())
    }

    /// Digest of the ordered concatenation of transaction hashes.
    /// An empty block commits to the empty string.
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> String {
        if transactions.is_empty() {
            return String::new();
        }
        let concatenated: String = transactions.iter().map(|tx| tx.get_hash()).collect();
        sha256_hex(concatenated.as_bytes())
    }

    pub fn verify_merkle_root(&self) -> bool {
        Self::calculate_merkle_root(&self.transactions) == self.merkle_root
    }

    /// Record a solved nonce together with the hash it produced
    pub fn set_solution(&mut self, nonce: u64, hash: String) {
        self.nonce = nonce;
        self.hash = hash;
    }

    pub(crate) fn transactions_mut(&mut self) -> &mut [Transaction] {
        self.transactions.as_mut_slice()
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_prev_hash(&self) -> &str {
        self.prev_hash.as_str()
    }

    pub fn get_merkle_root(&self) -> &str {
        self.merkle_root.as_str()
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_miner(&self) -> &str {
        self.miner.as_str()
    }

    pub fn get_block_reward(&self) -> u64 {
        self.block_reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: u64) -> Transaction {
        Transaction::with_timestamp("a", "b", amount, 0, 0, 1_700_000_000)
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = Block::genesis("genesis_address", 1_000_000, 4);
        let b = Block::genesis("genesis_address", 1_000_000, 4);
        assert_eq!(a.get_hash(), b.get_hash());
        assert_eq!(a.get_index(), 0);
        assert_eq!(a.get_prev_hash(), "0");
        assert_eq!(a.get_block_reward(), 0);
    }

    #[test]
    fn test_merkle_root_depends_on_order() {
        let forward = Block::calculate_merkle_root(&[tx(1), tx(2)]);
        let reversed = Block::calculate_merkle_root(&[tx(2), tx(1)]);
        let substituted = Block::calculate_merkle_root(&[tx(1), tx(3)]);
        assert_ne!(forward, reversed);
        assert_ne!(forward, substituted);
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let block = Block::new_block(1, vec![tx(1)], "prev".to_string(), 1, "miner", 50).unwrap();
        assert_eq!(block.get_hash(), block.calculate_hash_with_nonce(0));
        assert_ne!(
            block.calculate_hash_with_nonce(0),
            block.calculate_hash_with_nonce(1)
        );
    }

    #[test]
    fn test_hash_covers_miner_and_reward() {
        let a = Block::assemble(1, 10, vec![tx(1)], "p".to_string(), 1, "m1", 50);
        let b = Block::assemble(1, 10, vec![tx(1)], "p".to_string(), 1, "m2", 50);
        let c = Block::assemble(1, 10, vec![tx(1)], "p".to_string(), 1, "m1", 51);
        assert_ne!(a.get_hash(), b.get_hash());
        assert_ne!(a.get_hash(), c.get_hash());
    }

    #[test]
    fn test_json_field_names() {
        let block = Block::genesis("genesis_address", 1_000_000, 2);
        let json = serde_json::to_value(&block).unwrap();
        for field in [
            "version",
            "index",
            "timestamp",
            "prev_hash",
            "merkle_root",
            "transactions",
            "nonce",
            "difficulty",
            "hash",
            "miner",
            "block_reward",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }
}
