use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::{debug, info};

/// How often a running search checks whether it should give up early
const ABORT_CHECK_INTERVAL: u64 = 10_000;

/// Serial nonce search over a candidate block.
///
/// Every attempt re-serializes and re-hashes the full header; nothing is cached.
pub struct ProofOfWork {
    block: Block,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block, difficulty: u32) -> ProofOfWork {
        ProofOfWork { block, difficulty }
    }

    /// True when `hash` starts with `difficulty` zero nibbles
    pub fn is_valid_hash(hash: &str, difficulty: u32) -> bool {
        let difficulty = difficulty as usize;
        hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Single-step check: recompute at the recorded nonce and test the prefix
    pub fn validate(block: &Block, difficulty: u32) -> bool {
        let hash = block.calculate_hash();
        Self::is_valid_hash(&hash, difficulty)
    }

    /// Search nonces `0..max_attempts` for a hash meeting the difficulty
    pub fn run(&self, max_attempts: u64) -> Result<(u64, String)> {
        self.run_until(max_attempts, || false)
    }

    /// Like [`ProofOfWork::run`], but polls `should_abort` periodically and
    /// stops with a `Mining` error when it returns true.
    pub fn run_until<F>(&self, max_attempts: u64, should_abort: F) -> Result<(u64, String)>
    where
        F: Fn() -> bool,
    {
        debug!(
            "Mining block {} with difficulty {}",
            self.block.get_index(),
            self.difficulty
        );
        let mut nonce = 0;
        while nonce < max_attempts {
            if nonce > 0 && nonce % ABORT_CHECK_INTERVAL == 0 && should_abort() {
                return Err(BlockchainError::Mining(format!(
                    "Mining of block {} aborted after {nonce} attempts",
                    self.block.get_index()
                )));
            }

            let hash = self.block.calculate_hash_with_nonce(nonce);
            if Self::is_valid_hash(&hash, self.difficulty) {
                info!(
                    "Block {} mined! Nonce: {nonce}, Hash: {hash}",
                    self.block.get_index()
                );
                return Ok((nonce, hash));
            }
            nonce += 1;
        }

        Err(BlockchainError::Mining(format!(
            "Failed to mine block after {max_attempts} attempts"
        )))
    }

    /// Run the search and write the solution into the block
    pub fn solve(mut block: Block, difficulty: u32, max_attempts: u64) -> Result<Block> {
        let pow = ProofOfWork::new_proof_of_work(block.clone(), difficulty);
        let (nonce, hash) = pow.run(max_attempts)?;
        block.set_solution(nonce, hash);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use std::cell::Cell;

    fn create_test_block(difficulty: u32) -> Block {
        let tx = Transaction::with_timestamp("a", "b", 10, 0, 0, 1_700_000_000);
        Block::new_block(1, vec![tx], "prev".to_string(), difficulty, "miner", 50).unwrap()
    }

    #[test]
    fn test_is_valid_hash_prefix() {
        assert!(ProofOfWork::is_valid_hash("00ab", 2));
        assert!(!ProofOfWork::is_valid_hash("0a0b", 2));
        assert!(ProofOfWork::is_valid_hash("anything", 0));
        assert!(!ProofOfWork::is_valid_hash("00", 3));
    }

    #[test]
    fn test_solved_block_validates() {
        let block = ProofOfWork::solve(create_test_block(2), 2, 10_000_000).unwrap();
        assert!(block.get_hash().starts_with("00"));
        assert_eq!(block.get_hash(), block.calculate_hash());
        assert!(ProofOfWork::validate(&block, 2));
    }

    #[test]
    fn test_search_starts_at_zero_and_finds_first_solution() {
        let block = create_test_block(1);
        let pow = ProofOfWork::new_proof_of_work(block.clone(), 1);
        let (nonce, _) = pow.run(1_000_000).unwrap();
        for earlier in 0..nonce {
            let hash = block.calculate_hash_with_nonce(earlier);
            assert!(!ProofOfWork::is_valid_hash(&hash, 1));
        }
    }

    #[test]
    fn test_attempt_ceiling_reports_failure() {
        let pow = ProofOfWork::new_proof_of_work(create_test_block(64), 64);
        let result = pow.run(100);
        assert!(matches!(result, Err(BlockchainError::Mining(_))));
    }

    #[test]
    fn test_abort_signal_stops_search() {
        let polls = Cell::new(0);
        let pow = ProofOfWork::new_proof_of_work(create_test_block(64), 64);
        let result = pow.run_until(u64::MAX, || {
            polls.set(polls.get() + 1);
            true
        });
        assert!(matches!(result, Err(BlockchainError::Mining(_))));
        assert_eq!(polls.get(), 1);
    }

    #[test]
    fn test_unsolved_block_fails_validation_at_high_difficulty() {
        let block = create_test_block(8);
        // nonce 0 producing eight leading zeros is astronomically unlikely
        assert!(!ProofOfWork::validate(&block, 8));
    }
}
