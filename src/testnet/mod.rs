//! Helpers shared by unit tests: easy chain params, signed transactions and
//! a one-call block miner.

pub mod test_utils;

pub use test_utils::*;
