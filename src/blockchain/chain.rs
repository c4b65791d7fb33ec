use log::{info, warn};
use thiserror::Error;

use super::block::Block;
use super::crypto;
use super::iterator::LedgerIterator;
use super::pow::{PowError, ProofOfWork};
use super::storage::{BlockStore, StorageError};
use super::transaction::{Transaction, TransactionError};
use crate::config::Config;

/// Memo carried by the coinbase of a freshly created ledger
pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Proof of work error: {0}")]
    PowError(#[from] PowError),

    #[error("No existing blockchain found at {0}, create one first")]
    NotInitialized(String),

    #[error("Blockchain already exists at {0}")]
    AlreadyExists(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Value overflow: {0}")]
    ValueOverflow(String),
}

impl BlockchainError {
    /// Whether this error rejects a payment for lack of funds
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            BlockchainError::TransactionError(TransactionError::InsufficientFunds { .. })
        )
    }
}

/// Represents the ledger
///
/// Owns the store handle and the in-memory tip. The tip only moves after
/// the store has committed the block it points at.
#[derive(Debug)]
pub struct Blockchain {
    /// Hash of the most recently appended block
    tip: Vec<u8>,

    /// Storage for blocks and the tip key
    store: BlockStore,

    /// Proof-of-work engine used to seal and check blocks
    pow: ProofOfWork,

    /// Mining reward minted by coinbase transactions
    subsidy: u64,
}

impl Blockchain {
    /// Opens a ledger, creating its genesis block if the store is empty
    ///
    /// # Arguments
    ///
    /// * `store` - The block store
    /// * `pow` - The proof-of-work engine
    /// * `subsidy` - The coinbase value
    /// * `genesis_builder` - Produces the genesis coinbase; only called for
    ///   an empty store
    ///
    /// # Returns
    ///
    /// The opened ledger
    pub fn open_or_create<F>(
        store: BlockStore,
        pow: ProofOfWork,
        subsidy: u64,
        genesis_builder: F,
    ) -> Result<Self, BlockchainError>
    where
        F: FnOnce() -> Result<Transaction, TransactionError>,
    {
        let tip = match store.tip()? {
            Some(tip) => {
                info!("Loaded blockchain with tip {}", crypto::to_hex(&tip));
                tip
            }
            None => {
                info!("No existing blockchain found in storage, creating genesis block");
                let genesis = Block::genesis(genesis_builder()?, &pow)?;
                let tip = store.init_tip(&genesis)?;
                if tip != genesis.hash {
                    warn!("Another writer created the genesis block first, using its tip");
                }
                tip
            }
        };

        Ok(Blockchain {
            tip,
            store,
            pow,
            subsidy,
        })
    }

    /// Opens an existing ledger held by `store`
    pub fn with_store(
        store: BlockStore,
        pow: ProofOfWork,
        subsidy: u64,
    ) -> Result<Self, BlockchainError> {
        let tip = store
            .tip()?
            .ok_or_else(|| BlockchainError::NotInitialized("the given store".to_string()))?;

        Ok(Blockchain {
            tip,
            store,
            pow,
            subsidy,
        })
    }

    /// Creates a new ledger whose genesis coinbase pays `address`
    ///
    /// Fails if the configured data directory already holds a ledger.
    pub fn create(config: &Config, address: &str) -> Result<Self, BlockchainError> {
        let location = config.data_dir.display().to_string();
        let store = BlockStore::open(&config.data_dir)?;
        if store.tip()?.is_some() {
            return Err(BlockchainError::AlreadyExists(location));
        }

        let subsidy = config.subsidy;
        Blockchain::open_or_create(store, config.proof_of_work()?, subsidy, || {
            Transaction::new_coinbase(address, GENESIS_COINBASE_DATA, subsidy)
        })
    }

    /// Opens the ledger in the configured data directory
    pub fn open(config: &Config) -> Result<Self, BlockchainError> {
        let location = config.data_dir.display().to_string();
        if !config.data_dir.exists() {
            return Err(BlockchainError::NotInitialized(location));
        }

        let store = BlockStore::open(&config.data_dir)?;
        match Blockchain::with_store(store, config.proof_of_work()?, config.subsidy) {
            Err(BlockchainError::NotInitialized(_)) => {
                Err(BlockchainError::NotInitialized(location))
            }
            other => other,
        }
    }

    pub fn tip(&self) -> &[u8] {
        &self.tip
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn subsidy(&self) -> u64 {
        self.subsidy
    }

    /// Mines a block holding `transactions` on top of the current tip
    ///
    /// Mining runs before any store transaction is opened. The block and
    /// the new tip are then written atomically; if that write fails, the
    /// tip is left where it was and the mined block is dropped.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block, BlockchainError> {
        for tx in &transactions {
            if tx.compute_id()?.as_slice() != tx.id.as_slice() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "transaction {} does not match its id",
                    tx.id_hex()
                )));
            }

            if tx.is_coinbase() && !self.mints_subsidy(tx) {
                return Err(BlockchainError::InvalidBlock(format!(
                    "coinbase {} does not mint exactly {} in one output",
                    tx.id_hex(),
                    self.subsidy
                )));
            }
        }

        let prev_hash = self
            .store
            .tip()?
            .ok_or_else(|| BlockchainError::InvalidChain("tip key is missing".to_string()))?;

        let block = Block::seal(transactions, prev_hash, &self.pow)?;

        let replaced = self.store.append(&block)?;
        if replaced.as_deref() != Some(block.prev_hash.as_slice()) {
            // No fork choice here: the replaced tip's branch is now unreachable.
            warn!(
                "Tip moved while mining; block {} forks away from {}",
                block.hash_hex(),
                replaced.as_deref().map(crypto::to_hex).unwrap_or_default()
            );
        }

        self.tip = block.hash.clone();
        info!(
            "Appended block {} with {} transaction(s)",
            block.hash_hex(),
            block.transactions.len()
        );

        Ok(block)
    }

    /// Returns a cursor positioned at the current tip
    pub fn iterator(&self) -> LedgerIterator {
        LedgerIterator::new(self.tip.clone(), self.store.clone())
    }

    /// Gets a block by its hash
    pub fn get_block(&self, hash: &[u8]) -> Result<Block, BlockchainError> {
        Ok(self.store.get_block(hash)?)
    }

    /// Number of blocks from the tip back to genesis
    pub fn height(&self) -> Result<usize, BlockchainError> {
        let mut count = 0;
        for block in self.iterator() {
            block?;
            count += 1;
        }
        Ok(count)
    }

    /// Validates the whole chain
    ///
    /// Checks every block's proof of work, that its stored hash is the
    /// digest of its header, that it sits under its own hash, that its
    /// transactions match their ids and that coinbases mint the subsidy.
    /// The walk must end at a genesis block.
    ///
    /// # Returns
    ///
    /// The number of blocks checked
    pub fn verify(&self) -> Result<usize, BlockchainError> {
        let mut expected = self.tip.clone();
        let mut count = 0;

        for block in self.iterator() {
            let block = block?;
            let label = block.hash_hex();

            if block.hash != expected {
                return Err(BlockchainError::InvalidChain(format!(
                    "block stored under {} reports hash {}",
                    crypto::to_hex(&expected),
                    label
                )));
            }

            let digest = crypto::sha256(&block.header_bytes(block.nonce, self.pow.target_bits()));
            if digest.as_slice() != block.hash.as_slice() || !self.pow.validate(&block) {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} fails proof of work",
                    label
                )));
            }

            for tx in &block.transactions {
                if tx.compute_id()?.as_slice() != tx.id.as_slice() {
                    return Err(BlockchainError::InvalidChain(format!(
                        "transaction {} in block {} does not match its id",
                        tx.id_hex(),
                        label
                    )));
                }

                if tx.is_coinbase() && !self.mints_subsidy(tx) {
                    return Err(BlockchainError::InvalidChain(format!(
                        "coinbase {} in block {} does not mint exactly {} in one output",
                        tx.id_hex(),
                        label,
                        self.subsidy
                    )));
                }
            }

            expected = block.prev_hash;
            count += 1;
        }

        info!("Verified {} block(s)", count);
        Ok(count)
    }

    fn mints_subsidy(&self, coinbase: &Transaction) -> bool {
        matches!(coinbase.outputs.as_slice(), [out] if out.value == self.subsidy)
    }

    /// Flushes and releases the store handle
    pub fn close(self) -> Result<(), BlockchainError> {
        self.store.flush()?;
        info!("Closed blockchain at tip {}", crypto::to_hex(&self.tip));
        Ok(())
    }
}
