//! Ledger core
//!
//! Transactions and blocks, the chain state machine that validates and commits
//! them, the proof-of-work search and the mining loop that drives it.

pub mod block;
pub mod blockchain;
pub mod miner;
pub mod params;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{validate_chain, Blockchain, ChainInfo};
pub use miner::{mine_once, BlockAnnouncer, Miner};
pub use params::ChainParams;
pub use proof_of_work::ProofOfWork;
pub use transaction::{Transaction, TxStatus};
