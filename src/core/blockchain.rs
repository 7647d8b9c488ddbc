// The chain state machine. One ChainState value lives behind one RwLock:
// mutations (append, admit, rollback) take the write side, queries the read side.
// Callers only ever get copies out, never references into the maps.

use crate::core::params::{ChainParams, MAX_BLOCK_TRANSACTIONS, MAX_FUTURE_DRIFT_SECS};
use crate::core::{Block, ProofOfWork, Transaction, TxStatus};
use crate::error::{BlockchainError, Result};
use crate::storage::{ChainSnapshot, SnapshotStore};
use crate::utils::current_timestamp;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct ChainState {
    chain: Vec<Block>,
    pool: Vec<Transaction>,
    accounts: HashMap<String, u64>,
    // hashes of every transaction already in a committed block
    committed: HashSet<String>,
    minted: u64,
    burned: u64,
}

/// Summary of the chain suitable for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    pub height: u64,
    pub difficulty: u32,
    pub block_reward: u64,
    pub pending_transactions: usize,
    pub total_accounts: usize,
    pub last_block_hash: String,
    pub total_supply: u64,
}

impl ChainState {
    fn genesis(params: &ChainParams) -> ChainState {
        let genesis = Block::genesis(
            &params.genesis_address,
            params.genesis_allocation,
            params.difficulty,
        );
        let mut accounts = HashMap::new();
        accounts.insert(params.genesis_address.clone(), params.genesis_allocation);
        let committed = genesis
            .get_transactions()
            .iter()
            .map(|tx| tx.get_hash().to_string())
            .collect();

        ChainState {
            chain: vec![genesis],
            pool: Vec::new(),
            accounts,
            committed,
            minted: 0,
            burned: 0,
        }
    }

    /// Replay `blocks` on top of a fresh genesis, validating each one
    fn rebuild(params: &ChainParams, blocks: &[Block]) -> Result<ChainState> {
        let mut state = ChainState::genesis(params);
        let Some((first, rest)) = blocks.split_first() else {
            return Ok(state);
        };
        if first.get_hash() != state.tip().get_hash() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Genesis mismatch: expected {}, found {}",
                state.tip().get_hash(),
                first.get_hash()
            )));
        }
        for block in rest {
            let delta = state.validate_block(params, block)?;
            state.apply_block(block.clone(), delta);
        }
        Ok(state)
    }

    fn tip(&self) -> &Block {
        // the genesis block can never be removed, so the chain is never empty
        &self.chain[self.chain.len() - 1]
    }

    fn height(&self) -> u64 {
        self.chain.len() as u64
    }

    fn balance_of(&self, address: &str) -> u64 {
        self.accounts.get(address).copied().unwrap_or(0)
    }

    /// Check `block` against the current tip and return the balances it would
    /// leave behind for every account it touches. Nothing is mutated.
    fn validate_block(&self, params: &ChainParams, block: &Block) -> Result<BlockDelta> {
        if block.get_index() != self.height() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block index {} does not extend height {}",
                block.get_index(),
                self.height()
            )));
        }
        if block.get_prev_hash() != self.tip().get_hash() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} does not link to tip {}",
                block.get_index(),
                self.tip().get_hash()
            )));
        }
        if block.get_version() < 1 {
            return Err(BlockchainError::InvalidBlock(format!(
                "Unsupported block version {}",
                block.get_version()
            )));
        }
        if block.get_timestamp() > current_timestamp()? + MAX_FUTURE_DRIFT_SECS {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} is stamped too far in the future",
                block.get_index()
            )));
        }
        if block.get_transactions().len() > MAX_BLOCK_TRANSACTIONS {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block carries {} transactions, limit is {MAX_BLOCK_TRANSACTIONS}",
                block.get_transactions().len()
            )));
        }
        if block.get_block_reward() != params.block_reward {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block reward {} differs from the configured {}",
                block.get_block_reward(),
                params.block_reward
            )));
        }
        if !block.verify_merkle_root() {
            return Err(BlockchainError::InvalidBlock(
                "Merkle root does not match transactions".to_string(),
            ));
        }
        if block.get_hash() != block.calculate_hash() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Stored hash {} does not match header",
                block.get_hash()
            )));
        }
        if !ProofOfWork::validate(block, params.difficulty) {
            return Err(BlockchainError::InvalidBlock(format!(
                "Hash {} does not meet difficulty {}",
                block.get_hash(),
                params.difficulty
            )));
        }

        let mut delta = BlockDelta::default();
        let mut seen = HashSet::new();
        for tx in block.get_transactions() {
            tx.validate()
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
            if self.committed.contains(tx.get_hash()) || !seen.insert(tx.get_hash()) {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Transaction {} is already committed",
                    tx.get_hash()
                )));
            }
            delta
                .transfer(self, tx)
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
        }
        delta.credit(self, block.get_miner(), block.get_block_reward())?;
        Ok(delta)
    }

    fn apply_block(&mut self, mut block: Block, delta: BlockDelta) {
        for (address, balance) in delta.balances {
            self.accounts.insert(address, balance);
        }
        self.minted += block.get_block_reward();
        self.burned += delta.fees;

        let included: HashSet<&str> = block
            .get_transactions()
            .iter()
            .map(|tx| tx.get_hash())
            .collect();
        self.pool.retain(|tx| !included.contains(tx.get_hash()));
        for tx in block.transactions_mut() {
            tx.set_status(TxStatus::Confirmed);
            self.committed.insert(tx.get_hash().to_string());
        }
        self.chain.push(block);
    }

    fn total_supply(&self) -> u64 {
        self.accounts.values().sum()
    }
}

/// Balances a block would produce for the accounts it touches
#[derive(Default)]
struct BlockDelta {
    balances: HashMap<String, u64>,
    fees: u64,
}

impl BlockDelta {
    fn balance(&self, state: &ChainState, address: &str) -> u64 {
        self.balances
            .get(address)
            .copied()
            .unwrap_or_else(|| state.balance_of(address))
    }

    fn transfer(&mut self, state: &ChainState, tx: &Transaction) -> Result<()> {
        let required = tx.total_cost()?;
        let available = self.balance(state, tx.get_from());
        if available < required {
            return Err(BlockchainError::InsufficientFunds {
                required,
                available,
            });
        }
        self.balances
            .insert(tx.get_from().to_string(), available - required);
        self.credit(state, tx.get_to(), tx.get_amount())?;
        self.fees += tx.get_fee();
        Ok(())
    }

    fn credit(&mut self, state: &ChainState, address: &str, amount: u64) -> Result<()> {
        let balance = self
            .balance(state, address)
            .checked_add(amount)
            .ok_or_else(|| {
                BlockchainError::InvalidBlock(format!("Balance overflow for {address}"))
            })?;
        self.balances.insert(address.to_string(), balance);
        Ok(())
    }
}

/// Walk `blocks` from genesis checking linkage, recomputed hashes, merkle
/// roots and proof-of-work. The genesis block is exempt from proof-of-work.
pub fn validate_chain(blocks: &[Block], difficulty: u32) -> bool {
    let Some(genesis) = blocks.first() else {
        return false;
    };
    if genesis.get_hash() != genesis.calculate_hash() {
        return false;
    }
    blocks.windows(2).all(|pair| {
        let (previous, current) = (&pair[0], &pair[1]);
        current.get_hash() == current.calculate_hash()
            && current.get_prev_hash() == previous.get_hash()
            && current.get_index() == previous.get_index() + 1
            && current.verify_merkle_root()
            && ProofOfWork::validate(current, difficulty)
    })
}

#[derive(Clone)]
pub struct Blockchain {
    state: Arc<RwLock<ChainState>>,
    params: Arc<ChainParams>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl Blockchain {
    /// A fresh in-memory chain holding only the genesis block
    pub fn new(params: ChainParams) -> Blockchain {
        let state = ChainState::genesis(&params);
        Self::from_state(state, params, None)
    }

    /// Open a chain backed by `store`. Whatever the store holds is replayed
    /// through full block validation; if loading or replay fails the node
    /// starts from genesis instead.
    pub fn with_store(params: ChainParams, store: Arc<dyn SnapshotStore>) -> Blockchain {
        let state = match Self::load_state(&params, store.as_ref()) {
            Ok(Some(state)) => {
                info!("Restored chain at height {}", state.height());
                state
            }
            Ok(None) => {
                info!("No stored chain found, starting from genesis");
                ChainState::genesis(&params)
            }
            Err(e) => {
                warn!("Discarding stored chain, starting from genesis: {e}");
                ChainState::genesis(&params)
            }
        };
        Self::from_state(state, params, Some(store))
    }

    /// Like `with_store`, but a stored chain that cannot be loaded or replayed
    /// is an error. An empty store still yields a genesis-only chain.
    pub fn open(params: ChainParams, store: Arc<dyn SnapshotStore>) -> Result<Blockchain> {
        let state = match Self::load_state(&params, store.as_ref())? {
            Some(state) => state,
            None => ChainState::genesis(&params),
        };
        Ok(Self::from_state(state, params, Some(store)))
    }

    fn from_state(
        state: ChainState,
        params: ChainParams,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Blockchain {
        Blockchain {
            state: Arc::new(RwLock::new(state)),
            params: Arc::new(params),
            store,
        }
    }

    fn load_state(params: &ChainParams, store: &dyn SnapshotStore) -> Result<Option<ChainState>> {
        match store.load_chain()? {
            Some(snapshot) => Self::restore_state(params, snapshot).map(Some),
            None => Ok(None),
        }
    }

    fn restore_state(params: &ChainParams, snapshot: ChainSnapshot) -> Result<ChainState> {
        let mut state = ChainState::rebuild(params, &snapshot.blocks)?;
        if !snapshot.accounts.is_empty() {
            let replayed: BTreeMap<&str, u64> = state
                .accounts
                .iter()
                .map(|(address, balance)| (address.as_str(), *balance))
                .collect();
            let stored: BTreeMap<&str, u64> = snapshot
                .accounts
                .iter()
                .map(|(address, balance)| (address.as_str(), *balance))
                .collect();
            if replayed != stored {
                warn!("Stored account balances differ from replayed chain; using replayed values");
            }
        }
        for tx in snapshot.pool {
            if let Err(e) = Self::admit_into(&mut state, tx) {
                warn!("Dropping stored pool transaction: {e}");
            }
        }
        Ok(state)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Validate `block` against the current tip and commit it atomically.
    /// On error the state is untouched.
    pub fn append_block(&self, block: Block) -> Result<()> {
        let committed = {
            let mut state = self.write_state();
            let delta = state.validate_block(&self.params, &block)?;
            state.apply_block(block, delta);
            state.tip().clone()
        };

        info!(
            "Committed block {} ({}) with {} transactions",
            committed.get_index(),
            committed.get_hash(),
            committed.get_transactions().len()
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.save_block(&committed) {
                error_on_persist("block", &e);
            }
        }
        Ok(())
    }

    /// Would `block` be accepted right now? Does not mutate anything.
    pub fn check_block(&self, block: &Block) -> Result<()> {
        self.read_state()
            .validate_block(&self.params, block)
            .map(|_| ())
    }

    /// Admit a transaction into the pool. The balance check is against the
    /// committed state only; other pool entries are not reserved against.
    pub fn admit_transaction(&self, tx: Transaction) -> Result<()> {
        let hash = tx.get_hash().to_string();
        Self::admit_into(&mut self.write_state(), tx)?;
        info!("Admitted transaction {hash} to the pool");
        Ok(())
    }

    fn admit_into(state: &mut ChainState, mut tx: Transaction) -> Result<()> {
        tx.validate()?;
        if state.committed.contains(tx.get_hash()) {
            return Err(BlockchainError::Transaction(format!(
                "Transaction {} is already committed",
                tx.get_hash()
            )));
        }
        if state.pool.iter().any(|p| p.get_hash() == tx.get_hash()) {
            return Err(BlockchainError::Transaction(format!(
                "Transaction {} is already pending",
                tx.get_hash()
            )));
        }
        let required = tx.total_cost()?;
        let available = state.balance_of(tx.get_from());
        if available < required {
            return Err(BlockchainError::InsufficientFunds {
                required,
                available,
            });
        }
        tx.set_status(TxStatus::Pending);
        state.pool.push(tx);
        Ok(())
    }

    /// Assemble an unsolved block extending the tip from up to
    /// `max_block_transactions` pool entries, in pool order.
    ///
    /// Entries are simulated against a running balance: an entry that would
    /// overdraw given the ones selected before it is skipped and stays pending;
    /// an entry that is invalid or unaffordable even on committed balances is
    /// discarded from the pool.
    pub fn build_candidate_block(&self, miner: &str) -> Result<Block> {
        let mut state = self.write_state();
        let mut delta = BlockDelta::default();
        let mut selected = Vec::new();
        let mut discarded = HashSet::new();

        for tx in &state.pool {
            if selected.len() >= self.params.max_block_transactions {
                break;
            }
            if let Err(e) = tx.validate() {
                warn!("Discarding invalid pool transaction {}: {e}", tx.get_hash());
                discarded.insert(tx.get_hash().to_string());
                continue;
            }
            let standalone_ok = tx
                .total_cost()
                .map(|cost| state.balance_of(tx.get_from()) >= cost)
                .unwrap_or(false);
            if state.committed.contains(tx.get_hash()) || !standalone_ok {
                warn!(
                    "Discarding unaffordable pool transaction {} from {}",
                    tx.get_hash(),
                    tx.get_from()
                );
                discarded.insert(tx.get_hash().to_string());
                continue;
            }
            match delta.transfer(&state, tx) {
                Ok(()) => selected.push(tx.clone()),
                Err(e) => info!(
                    "Deferring pool transaction {} to a later block: {e}",
                    tx.get_hash()
                ),
            }
        }

        if !discarded.is_empty() {
            state.pool.retain(|tx| !discarded.contains(tx.get_hash()));
        }

        Block::new_block(
            state.height(),
            selected,
            state.tip().get_hash().to_string(),
            self.params.difficulty,
            miner,
            self.params.block_reward,
        )
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.read_state().balance_of(address)
    }

    pub fn last_block(&self) -> Block {
        self.read_state().tip().clone()
    }

    pub fn tip_hash(&self) -> String {
        self.read_state().tip().get_hash().to_string()
    }

    /// Number of committed blocks, which is also the index the next block must carry
    pub fn height(&self) -> u64 {
        self.read_state().height()
    }

    pub fn is_chain_valid(&self) -> bool {
        validate_chain(&self.read_state().chain, self.params.difficulty)
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read_state().chain.clone()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.read_state().pool.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.read_state().pool.len()
    }

    pub fn is_pending(&self, hash: &str) -> bool {
        self.read_state()
            .pool
            .iter()
            .any(|tx| tx.get_hash() == hash)
    }

    pub fn is_committed(&self, hash: &str) -> bool {
        self.read_state().committed.contains(hash)
    }

    /// Copy of every account balance, ordered by address
    pub fn accounts(&self) -> BTreeMap<String, u64> {
        self.read_state()
            .accounts
            .iter()
            .map(|(address, balance)| (address.clone(), *balance))
            .collect()
    }

    pub fn chain_info(&self) -> ChainInfo {
        let state = self.read_state();
        ChainInfo {
            height: state.height(),
            difficulty: self.params.difficulty,
            block_reward: self.params.block_reward,
            pending_transactions: state.pool.len(),
            total_accounts: state.accounts.len(),
            last_block_hash: state.tip().get_hash().to_string(),
            total_supply: state.total_supply(),
        }
    }

    /// Check the invariants that must hold after every mutation
    pub fn verify_state_integrity(&self) -> Result<()> {
        let state = self.read_state();
        if !validate_chain(&state.chain, self.params.difficulty) {
            return Err(BlockchainError::InvalidBlock(
                "Chain failed validation".to_string(),
            ));
        }
        if let Some(tx) = state.pool.iter().find(|tx| !tx.is_valid()) {
            return Err(BlockchainError::Transaction(format!(
                "Invalid transaction in pool: {}",
                tx.get_hash()
            )));
        }
        let expected = (self.params.genesis_allocation + state.minted)
            .checked_sub(state.burned)
            .ok_or_else(|| {
                BlockchainError::InvalidBlock("More fees burned than value issued".to_string())
            })?;
        let actual = state.total_supply();
        if actual != expected {
            return Err(BlockchainError::InvalidBlock(format!(
                "Total supply {actual} differs from issued value {expected}"
            )));
        }
        Ok(())
    }

    /// Privileged recovery: keep blocks `0..=height`, rebuild balances by
    /// replay and return the transactions of the dropped blocks to the pool.
    /// Returns the number of blocks removed.
    pub fn rollback_to_height(&self, height: u64) -> Result<usize> {
        let removed = {
            let mut state = self.write_state();
            if height.saturating_add(1) >= state.height() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Cannot roll back to height {height}, chain has {} blocks",
                    state.height()
                )));
            }
            let keep = usize::try_from(height + 1).map_err(|_| {
                BlockchainError::InvalidBlock(format!("Height {height} out of range"))
            })?;
            info!(
                "Rolling back chain from height {} to {height}",
                state.height() - 1
            );

            let mut rebuilt = ChainState::rebuild(&self.params, &state.chain[..keep])?;
            let dropped = state.chain.split_off(keep);
            let removed = dropped.len();
            let previous_pool = std::mem::take(&mut state.pool);
            for mut tx in dropped
                .into_iter()
                .flat_map(|block| block.get_transactions().to_vec())
                .chain(previous_pool)
            {
                tx.set_status(TxStatus::Pending);
                if let Err(e) = Self::admit_into(&mut rebuilt, tx) {
                    warn!("Transaction not returned to pool after rollback: {e}");
                }
            }
            *state = rebuilt;

            // still under the write lock: no commit may land between the save
            // and the removal of the dropped blocks
            if let Some(store) = &self.store {
                let snapshot = self.snapshot_of(&state);
                let saved = store
                    .save_chain(&snapshot)
                    .and_then(|()| store.truncate_blocks(snapshot.blocks.len() as u64));
                if let Err(e) = saved {
                    error_on_persist("rollback", &e);
                }
            }
            removed
        };

        Ok(removed)
    }

    /// Copy everything the snapshot store needs
    pub fn snapshot(&self) -> ChainSnapshot {
        self.snapshot_of(&self.read_state())
    }

    fn snapshot_of(&self, state: &ChainState) -> ChainSnapshot {
        ChainSnapshot {
            blocks: state.chain.clone(),
            pool: state.pool.clone(),
            accounts: state
                .accounts
                .iter()
                .map(|(address, balance)| (address.clone(), *balance))
                .collect(),
            difficulty: self.params.difficulty,
            block_reward: self.params.block_reward,
        }
    }

    /// Best-effort full save through the attached store
    pub fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.snapshot();
        match store.save_chain(&snapshot) {
            Ok(()) => info!(
                "Chain saved: {} blocks, {} pending transactions",
                snapshot.blocks.len(),
                snapshot.pool.len()
            ),
            Err(e) => error_on_persist("chain", &e),
        }
    }
}

fn error_on_persist(what: &str, e: &BlockchainError) {
    error!("Failed to persist {what}: {e}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;
    use crate::testnet::{create_test_blockchain, mine_next_block, signed_transaction, test_params};

    #[test]
    fn test_new_chain_holds_genesis_allocation() {
        let chain = Blockchain::new(test_params());
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.balance_of("genesis_address"), 1_000_000);
        assert_eq!(chain.last_block().get_index(), 0);
        assert!(chain.is_chain_valid());
    }

    #[test]
    fn test_admission_rejects_insufficient_balance() {
        let chain = Blockchain::new(test_params());
        let tx = signed_transaction("nobody", "A", 10, 0);
        assert_eq!(
            chain.admit_transaction(tx),
            Err(BlockchainError::InsufficientFunds {
                required: 10,
                available: 0
            })
        );
        assert_eq!(chain.pending_count(), 0);
    }

    #[test]
    fn test_admission_rejects_duplicates() {
        let chain = Blockchain::new(test_params());
        let tx = signed_transaction("genesis_address", "A", 10, 0);
        chain.admit_transaction(tx.clone()).unwrap();
        assert!(chain.admit_transaction(tx).is_err());
        assert_eq!(chain.pending_count(), 1);
    }

    #[test]
    fn test_commit_marks_transactions_confirmed() {
        let chain = Blockchain::new(test_params());
        let tx = signed_transaction("genesis_address", "A", 10, 0);
        let hash = tx.get_hash().to_string();
        chain.admit_transaction(tx.clone()).unwrap();

        mine_next_block(&chain, "M").unwrap();

        assert!(chain.is_committed(&hash));
        assert!(!chain.is_pending(&hash));
        let tip = chain.last_block();
        let stored = &tip.get_transactions()[0];
        assert_eq!(stored.get_status(), TxStatus::Confirmed);
        // replaying a committed transaction is refused
        assert!(chain.admit_transaction(tx).is_err());
    }

    #[test]
    fn test_wrong_reward_rejected() {
        let chain = Blockchain::new(test_params());
        let block = Block::new_block(
            1,
            vec![],
            chain.tip_hash(),
            chain.params().difficulty,
            "M",
            chain.params().block_reward + 1,
        )
        .unwrap();
        let block = ProofOfWork::solve(block, chain.params().difficulty, 1_000_000).unwrap();
        assert!(matches!(
            chain.append_block(block),
            Err(BlockchainError::InvalidBlock(_))
        ));
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_candidate_defers_cumulative_overdraft_and_discards_unaffordable() {
        let chain = Blockchain::new(test_params());
        let first = signed_transaction("genesis_address", "A", 600_000, 0);
        let second = signed_transaction("genesis_address", "B", 600_000, 0);
        chain.admit_transaction(first.clone()).unwrap();
        chain.admit_transaction(second.clone()).unwrap();

        let candidate = chain.build_candidate_block("M").unwrap();
        assert_eq!(candidate.get_transactions().len(), 1);
        assert_eq!(candidate.get_transactions()[0].get_hash(), first.get_hash());
        assert_eq!(chain.pending_count(), 2);

        mine_next_block(&chain, "M").unwrap();
        assert_eq!(chain.pending_transactions()[0].get_hash(), second.get_hash());

        let next = chain.build_candidate_block("M").unwrap();
        assert!(next.get_transactions().is_empty());
        assert_eq!(chain.pending_count(), 0);
    }

    #[test]
    fn test_candidate_respects_transaction_limit() {
        let mut params = test_params();
        params.max_block_transactions = 2;
        let chain = Blockchain::new(params);
        for i in 0..3 {
            chain
                .admit_transaction(signed_transaction("genesis_address", "A", 10 + i, 0))
                .unwrap();
        }
        let candidate = chain.build_candidate_block("M").unwrap();
        assert_eq!(candidate.get_transactions().len(), 2);
        assert_eq!(candidate.get_index(), 1);
        assert_eq!(candidate.get_prev_hash(), chain.tip_hash());
    }

    #[test]
    fn test_rollback_restores_balances_and_pool() {
        let chain = Blockchain::new(test_params());
        let tx = signed_transaction("genesis_address", "A", 100, 1);
        chain.admit_transaction(tx.clone()).unwrap();
        mine_next_block(&chain, "M").unwrap();
        assert_eq!(chain.balance_of("A"), 100);

        let removed = chain.rollback_to_height(0).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.balance_of("A"), 0);
        assert_eq!(chain.balance_of("M"), 0);
        assert_eq!(chain.balance_of("genesis_address"), 1_000_000);
        assert!(chain.is_pending(tx.get_hash()));
        assert!(chain.verify_state_integrity().is_ok());
    }

    #[test]
    fn test_rollback_cannot_remove_genesis_or_go_forward() {
        let chain = Blockchain::new(test_params());
        assert!(chain.rollback_to_height(0).is_err());
        assert!(chain.rollback_to_height(5).is_err());
    }

    #[test]
    fn test_integrity_accounts_for_burned_fees() {
        let chain = Blockchain::new(test_params());
        chain
            .admit_transaction(signed_transaction("genesis_address", "A", 100, 7))
            .unwrap();
        mine_next_block(&chain, "M").unwrap();

        let info = chain.chain_info();
        assert_eq!(info.total_supply, 1_000_000 + 50 - 7);
        assert!(chain.verify_state_integrity().is_ok());
    }

    #[test]
    fn test_reopen_replays_stored_chain() {
        let (chain, dir) = create_test_blockchain().unwrap();
        chain
            .admit_transaction(signed_transaction("genesis_address", "A", 100, 1))
            .unwrap();
        mine_next_block(&chain, "M").unwrap();
        let pending = signed_transaction("genesis_address", "B", 5, 0);
        chain.admit_transaction(pending.clone()).unwrap();
        chain.persist();

        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let reopened = Blockchain::with_store(test_params(), store);
        assert_eq!(reopened.tip_hash(), chain.tip_hash());
        assert_eq!(reopened.balance_of("A"), 100);
        assert!(reopened.is_pending(pending.get_hash()));
    }

    #[test]
    fn test_stored_chain_from_other_params_falls_back_to_genesis() {
        let (chain, dir) = create_test_blockchain().unwrap();
        mine_next_block(&chain, "M").unwrap();
        chain.persist();

        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let reopened = Blockchain::with_store(test_params().with_block_reward(7), store);
        assert_eq!(reopened.height(), 1);
        assert_eq!(reopened.balance_of("M"), 0);
    }

    #[test]
    fn test_open_reports_unreplayable_chain() {
        let (chain, dir) = create_test_blockchain().unwrap();
        mine_next_block(&chain, "M").unwrap();
        chain.persist();

        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        assert!(Blockchain::open(test_params().with_block_reward(7), store.clone()).is_err());
        let reopened = Blockchain::open(test_params(), store).unwrap();
        assert_eq!(reopened.height(), 2);
    }

    #[test]
    fn test_open_empty_store_starts_at_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let chain = Blockchain::open(test_params(), store).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_rollback_is_persisted() {
        let (chain, dir) = create_test_blockchain().unwrap();
        mine_next_block(&chain, "M").unwrap();
        mine_next_block(&chain, "M").unwrap();
        mine_next_block(&chain, "M").unwrap();

        assert_eq!(chain.rollback_to_height(1).unwrap(), 2);

        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let reopened = Blockchain::open(test_params(), store).unwrap();
        assert_eq!(reopened.height(), 2);
        assert_eq!(reopened.tip_hash(), chain.tip_hash());
        assert!(!dir.path().join("block_2.json").exists());
    }

    #[test]
    fn test_validate_chain_rejects_empty() {
        assert!(!validate_chain(&[], 1));
    }
}
