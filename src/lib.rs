//! A single-node proof-of-work ledger with UTXO accounting.

pub mod blockchain;
pub mod config;

pub use blockchain::{Block, Blockchain, BlockchainError, Transaction};
pub use config::Config;
