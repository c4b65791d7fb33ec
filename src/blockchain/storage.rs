use std::path::Path;

use log::debug;
use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use sled::{Db, Tree};
use thiserror::Error;

use super::block::Block;
use super::crypto::{self, EncodingError};

/// Name of the tree holding blocks and the tip key
pub const BLOCKS_TREE: &str = "blocks";

/// Reserved key whose value is the hash of the most recent block
pub const TIP_KEY: &[u8] = b"l";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] EncodingError),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Storage transaction aborted")]
    TransactionAborted,
}

impl From<TransactionError<()>> for StorageError {
    fn from(err: TransactionError<()>) -> Self {
        match err {
            TransactionError::Abort(()) => StorageError::TransactionAborted,
            TransactionError::Storage(e) => StorageError::DatabaseError(e),
        }
    }
}

/// Persistent block store
///
/// Blocks are stored in the `blocks` tree keyed by their hash, next to a
/// single tip entry. Writes that touch the tip go through sled
/// transactions, so a block and the tip pointing at it become visible
/// together or not at all.
#[derive(Clone)]
pub struct BlockStore {
    /// The database instance
    db: Db,

    /// Tree for blocks and the tip key
    blocks: Tree,
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore").finish()
    }
}

impl BlockStore {
    /// Opens (or creates) a block store
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the database directory
    ///
    /// # Returns
    ///
    /// A new BlockStore instance
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens a store that is deleted when the last handle is dropped
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        Ok(Self { db, blocks })
    }

    /// Reads the tip hash, `None` for an uninitialized store
    pub fn tip(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blocks.get(TIP_KEY)?.map(|value| value.to_vec()))
    }

    /// Gets a block by its hash
    ///
    /// # Arguments
    ///
    /// * `hash` - The hash of the block
    ///
    /// # Returns
    ///
    /// The block if found
    pub fn get_block(&self, hash: &[u8]) -> Result<Block, StorageError> {
        match self.blocks.get(hash)? {
            Some(value) => Ok(crypto::decode(&value)?),
            None => Err(StorageError::NotFound(format!(
                "Block with hash {} not found",
                crypto::to_hex(hash)
            ))),
        }
    }

    /// Whether a block with this hash is stored
    pub fn contains_block(&self, hash: &[u8]) -> Result<bool, StorageError> {
        Ok(hash != TIP_KEY && self.blocks.contains_key(hash)?)
    }

    /// Installs the genesis block unless a tip already exists
    ///
    /// Runs as one transaction: either the existing tip is returned and
    /// nothing is written, or the block and the tip are written together.
    ///
    /// # Returns
    ///
    /// The tip in effect after the call
    pub fn init_tip(&self, genesis: &Block) -> Result<Vec<u8>, StorageError> {
        let value = crypto::encode(genesis)?;
        let hash = genesis.hash.as_slice();

        let tip = self
            .blocks
            .transaction(|tx: &TransactionalTree| -> ConflictableTransactionResult<Vec<u8>> {
                if let Some(existing) = tx.get(TIP_KEY)? {
                    return Ok(existing.to_vec());
                }
                tx.insert(hash, value.as_slice())?;
                tx.insert(TIP_KEY, hash)?;
                Ok(hash.to_vec())
            })?;

        self.flush()?;
        Ok(tip)
    }

    /// Writes a block and moves the tip to it in one transaction
    ///
    /// # Returns
    ///
    /// The tip that was replaced
    pub fn append(&self, block: &Block) -> Result<Option<Vec<u8>>, StorageError> {
        let value = crypto::encode(block)?;
        let hash = block.hash.as_slice();

        let previous = self.blocks.transaction(
            |tx: &TransactionalTree| -> ConflictableTransactionResult<Option<Vec<u8>>> {
                let previous = tx.get(TIP_KEY)?.map(|v| v.to_vec());
                tx.insert(hash, value.as_slice())?;
                tx.insert(TIP_KEY, hash)?;
                Ok(previous)
            },
        )?;

        self.flush()?;
        debug!("Stored block {}", crypto::to_hex(hash));
        Ok(previous)
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Overwrites the raw value under `key`, bypassing the codec
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.blocks.insert(key, value)?;
        Ok(())
    }
}
