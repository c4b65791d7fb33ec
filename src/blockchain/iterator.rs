use super::block::Block;
use super::storage::{BlockStore, StorageError};

/// Iterator over the ledger from the tip to genesis
///
/// Each step loads the block at `current_hash` and moves to its
/// predecessor. Iteration ends after the genesis block, whose `prev_hash`
/// is empty. A lookup or decode failure is yielded once and ends the walk.
#[derive(Debug)]
pub struct LedgerIterator {
    current_hash: Vec<u8>,
    store: BlockStore,
}

impl LedgerIterator {
    pub(crate) fn new(tip: Vec<u8>, store: BlockStore) -> Self {
        LedgerIterator {
            current_hash: tip,
            store,
        }
    }

    /// Hash of the block the next call will yield
    pub fn current_hash(&self) -> &[u8] {
        &self.current_hash
    }
}

impl Iterator for LedgerIterator {
    type Item = Result<Block, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }

        match self.store.get_block(&self.current_hash) {
            Ok(block) => {
                self.current_hash = block.prev_hash.clone();
                Some(Ok(block))
            }
            Err(err) => {
                self.current_hash.clear();
                Some(Err(err))
            }
        }
    }
}
