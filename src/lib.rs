//! # pow-ledger
//!
//! A replicated account ledger secured by proof-of-work.
//!
//! ## Layout
//! - `core/`: transactions, blocks, the chain state machine, proof-of-work
//!   and the mining loop
//! - `network/`: TCP peer synchronization with length-prefixed JSON frames
//! - `storage/`: snapshot stores (JSON files or sled) and the periodic saver
//! - `wallet/`: ECDSA P-256 transaction signing
//! - `config/`: layered node configuration
//! - `utils/`: hashing, signatures and serialization helpers
//! - `cli/`: command-line arguments for the node binary
//!
//! ## Flow
//! Clients submit transactions, the chain admits them into its pool, the
//! miner assembles and solves a block, the chain commits it and the server
//! floods it to peers, which validate and commit the same block.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Config, StorageBackend};
pub use crate::core::{
    mine_once, validate_chain, Block, BlockAnnouncer, Blockchain, ChainInfo, ChainParams, Miner,
    ProofOfWork, Transaction, TxStatus,
};
pub use error::{BlockchainError, Result};
pub use network::{send_transaction, Message, MessageType, Payload, Server};
pub use storage::{
    open_store, ChainSnapshot, JsonFileStore, SledStore, SnapshotStore, StateManager,
};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
pub use wallet::Wallet;
