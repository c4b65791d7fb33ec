// Blockchain module
//
// This module contains the ledger implementation including:
// - Hashing and encoding primitives
// - Block structure
// - Proof of work engine
// - Transaction and UTXO model
// - Persistent block store and the ledger on top of it

pub mod block;
pub mod chain;
pub mod crypto;
pub mod iterator;
pub mod pow;
pub mod storage;
pub mod transaction;
mod utxo;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError};
pub use iterator::LedgerIterator;
pub use pow::ProofOfWork;
pub use storage::BlockStore;
pub use transaction::{Transaction, TxInput, TxOutput};
