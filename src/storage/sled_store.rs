use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{ChainSnapshot, SnapshotMetadata, SnapshotStore};
use crate::utils::{deserialize, serialize};
use sled::Db;
use std::collections::BTreeMap;
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";
const STATE_TREE: &str = "chainstate";
const METADATA_KEY: &str = "metadata";
const POOL_KEY: &str = "transaction_pool";
const ACCOUNTS_KEY: &str = "accounts";

/// Snapshot store on an embedded sled database. Blocks are keyed by
/// big-endian height so tree iteration yields them in chain order.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<SledStore> {
        let db = sled::open(path.as_ref())
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        Ok(SledStore { db })
    }

    fn blocks_tree(&self) -> Result<sled::Tree> {
        self.db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))
    }

    fn state_tree(&self) -> Result<sled::Tree> {
        self.db
            .open_tree(STATE_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open state tree: {e}")))
    }
}

impl SnapshotStore for SledStore {
    fn load_chain(&self) -> Result<Option<ChainSnapshot>> {
        let state = self.state_tree()?;
        let Some(metadata_bytes) = state.get(METADATA_KEY)? else {
            return Ok(None);
        };
        let metadata: SnapshotMetadata = deserialize(&metadata_bytes)?;

        let mut blocks = Vec::new();
        for item in self.blocks_tree()?.iter() {
            let (_, value) = item?;
            let block: Block = deserialize(&value)?;
            if block.get_index() != blocks.len() as u64 {
                return Err(BlockchainError::Database(format!(
                    "Gap in stored blocks at index {}",
                    blocks.len()
                )));
            }
            blocks.push(block);
        }

        let pool: Vec<Transaction> = match state.get(POOL_KEY)? {
            Some(bytes) => deserialize(&bytes)?,
            None => Vec::new(),
        };
        let accounts: BTreeMap<String, u64> = match state.get(ACCOUNTS_KEY)? {
            Some(bytes) => deserialize(&bytes)?,
            None => BTreeMap::new(),
        };

        Ok(Some(ChainSnapshot {
            blocks,
            pool,
            accounts,
            difficulty: metadata.difficulty,
            block_reward: metadata.block_reward,
        }))
    }

    fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<()> {
        let blocks = self.blocks_tree()?;
        for block in &snapshot.blocks {
            blocks.insert(block.get_index().to_be_bytes(), serialize(block)?)?;
        }

        let state = self.state_tree()?;
        state.insert(POOL_KEY, serialize(&snapshot.pool)?)?;
        state.insert(ACCOUNTS_KEY, serialize(&snapshot.accounts)?)?;
        state.insert(
            METADATA_KEY,
            serialize(&SnapshotMetadata::from_snapshot(snapshot))?,
        )?;
        self.db.flush()?;
        Ok(())
    }

    fn save_block(&self, block: &Block) -> Result<()> {
        self.blocks_tree()?
            .insert(block.get_index().to_be_bytes(), serialize(block)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn truncate_blocks(&self, height: u64) -> Result<()> {
        let blocks = self.blocks_tree()?;
        for stale in blocks.range(height.to_be_bytes()..).keys() {
            blocks.remove(stale?)?;
        }
        self.db.flush()?;
        Ok(())
    }
}
