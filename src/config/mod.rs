//! Configuration management
//!
//! Network, consensus and storage settings for a node. Everything the core
//! consumes (difficulty, block reward, peer timeout, bootstrap nodes, host and
//! port) comes from here.

pub mod settings;

pub use settings::{Config, StorageBackend, PROTOCOL_VERSION};
