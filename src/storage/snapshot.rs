use crate::core::{Block, Transaction};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a store needs to write out, copied out of the chain under its read lock
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
    pub pool: Vec<Transaction>,
    pub accounts: BTreeMap<String, u64>,
    pub difficulty: u32,
    pub block_reward: u64,
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SnapshotMetadata {
    pub height: u64,
    pub difficulty: u32,
    pub block_reward: u64,
    pub last_block: String,
    pub genesis_block: String,
}

impl SnapshotMetadata {
    pub fn from_snapshot(snapshot: &ChainSnapshot) -> Self {
        let hash_at = |block: Option<&Block>| {
            block
                .map(|b| b.get_hash().to_string())
                .unwrap_or_default()
        };
        Self {
            height: snapshot.blocks.len() as u64,
            difficulty: snapshot.difficulty,
            block_reward: snapshot.block_reward,
            last_block: hash_at(snapshot.blocks.last()),
            genesis_block: hash_at(snapshot.blocks.first()),
        }
    }
}

/// Durable save/restore of chain state.
///
/// Saves are best-effort from the chain's point of view: failures are logged by
/// the caller and never undo in-memory work. `load_chain` must be
/// all-or-nothing: it returns a complete snapshot, `Ok(None)` when nothing was
/// ever saved, or an error.
pub trait SnapshotStore: Send + Sync {
    fn load_chain(&self) -> Result<Option<ChainSnapshot>>;

    fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<()>;

    fn save_block(&self, block: &Block) -> Result<()>;

    /// Forget stored blocks at index `height` and above. A full save never
    /// removes blocks on its own, since a block saved after the snapshot was
    /// taken would be lost.
    fn truncate_blocks(&self, height: u64) -> Result<()>;
}
