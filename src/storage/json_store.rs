// Directory layout:
//   block_<index>.json, transaction_pool.json, accounts.json, metadata.json
// Every file is written to a temporary sibling and renamed into place.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{ChainSnapshot, SnapshotMetadata, SnapshotStore};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const METADATA_FILE: &str = "metadata.json";
const POOL_FILE: &str = "transaction_pool.json";
const ACCOUNTS_FILE: &str = "accounts.json";

pub struct JsonFileStore {
    data_dir: PathBuf,
    // serializes writers so a block save never interleaves with a full save
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<JsonFileStore> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| {
            BlockchainError::Database(format!(
                "Failed to create data directory {}: {e}",
                data_dir.display()
            ))
        })?;
        Ok(JsonFileStore {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn block_path(&self, index: u64) -> PathBuf {
        self.data_dir.join(format!("block_{index}.json"))
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let bytes = fs::read(path).map_err(|e| {
            BlockchainError::Database(format!("Failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            BlockchainError::Serialization(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    fn read_optional<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        if path.exists() {
            self.read_json(path)
        } else {
            Ok(T::default())
        }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load_chain(&self) -> Result<Option<ChainSnapshot>> {
        let metadata_path = self.data_dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Ok(None);
        }
        let metadata: SnapshotMetadata = self.read_json(&metadata_path)?;

        let mut blocks: Vec<Block> = Vec::new();
        for index in 0..metadata.height {
            blocks.push(self.read_json(&self.block_path(index))?);
        }
        // blocks saved one at a time after the last full save
        let mut next = metadata.height;
        while self.block_path(next).exists() {
            blocks.push(self.read_json(&self.block_path(next))?);
            next += 1;
        }

        if let Some(genesis) = blocks.first() {
            if genesis.get_hash() != metadata.genesis_block {
                return Err(BlockchainError::Database(format!(
                    "Genesis {} does not match metadata {}",
                    genesis.get_hash(),
                    metadata.genesis_block
                )));
            }
        }

        let pool: Vec<Transaction> = self.read_optional(&self.data_dir.join(POOL_FILE))?;
        let accounts: BTreeMap<String, u64> =
            self.read_optional(&self.data_dir.join(ACCOUNTS_FILE))?;

        debug!(
            "Loaded {} blocks and {} pool entries from {}",
            blocks.len(),
            pool.len(),
            self.data_dir.display()
        );
        Ok(Some(ChainSnapshot {
            blocks,
            pool,
            accounts,
            difficulty: metadata.difficulty,
            block_reward: metadata.block_reward,
        }))
    }

    fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        for block in &snapshot.blocks {
            self.write_json(&self.block_path(block.get_index()), block)?;
        }
        self.write_json(&self.data_dir.join(POOL_FILE), &snapshot.pool)?;
        self.write_json(&self.data_dir.join(ACCOUNTS_FILE), &snapshot.accounts)?;
        self.write_json(
            &self.data_dir.join(METADATA_FILE),
            &SnapshotMetadata::from_snapshot(snapshot),
        )
    }

    fn save_block(&self, block: &Block) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_json(&self.block_path(block.get_index()), block)
    }

    fn truncate_blocks(&self, height: u64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stale = height;
        while self.block_path(stale).exists() {
            fs::remove_file(self.block_path(stale))?;
            stale += 1;
        }
        if stale > height {
            debug!("Removed block files {height}..{stale}");
        }
        Ok(())
    }
}
