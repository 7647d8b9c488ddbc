//! Transaction signing
//!
//! The key service the ledger relies on: generate a key pair, sign a
//! transaction hash. Verification is in `utils::crypto`.

pub mod wallet;

pub use wallet::Wallet;
