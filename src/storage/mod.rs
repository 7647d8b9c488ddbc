//! Snapshot persistence
//!
//! The chain treats its store as an opaque collaborator: saves are
//! best-effort, loads are all-or-nothing. Two backends are provided, the
//! JSON file layout and an embedded sled database.

pub mod json_store;
pub mod sled_store;
pub mod snapshot;
pub mod state_manager;

pub use json_store::JsonFileStore;
pub use sled_store::SledStore;
pub use snapshot::{ChainSnapshot, SnapshotMetadata, SnapshotStore};
pub use state_manager::StateManager;

use crate::config::{Config, StorageBackend};
use crate::error::Result;
use std::sync::Arc;

/// Open the backend selected in the configuration
pub fn open_store(config: &Config) -> Result<Arc<dyn SnapshotStore>> {
    Ok(match config.storage_backend {
        StorageBackend::Json => Arc::new(JsonFileStore::new(&config.data_dir)?),
        StorageBackend::Sled => Arc::new(SledStore::open(config.data_dir.join("ledger.sled"))?),
    })
}
