use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::crypto::{self, Hash};
use super::pow::{PowError, ProofOfWork};
use super::transaction::Transaction;

/// Represents a block in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Seconds since the Unix epoch at creation
    pub timestamp: i64,

    /// Transactions in the block; order affects the header digest
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block, empty for the genesis block
    pub prev_hash: Vec<u8>,

    /// Proof-of-work digest of the header bytes at `nonce`
    pub hash: Vec<u8>,

    /// The winning nonce
    pub nonce: u64,
}

impl Block {
    /// Creates and mines a new block
    ///
    /// # Arguments
    ///
    /// * `transactions` - The transactions to include in the block
    /// * `prev_hash` - The hash of the previous block
    /// * `pow` - The proof-of-work engine used to seal the block
    ///
    /// # Returns
    ///
    /// The sealed block, with `hash` and `nonce` set
    pub fn seal(
        transactions: Vec<Transaction>,
        prev_hash: Vec<u8>,
        pow: &ProofOfWork,
    ) -> Result<Self, PowError> {
        let mut block = Block {
            timestamp: Utc::now().timestamp(),
            transactions,
            prev_hash,
            hash: Vec::new(),
            nonce: 0,
        };

        let (nonce, hash) = pow.mine(&block)?;
        block.nonce = nonce;
        block.hash = hash.to_vec();

        Ok(block)
    }

    /// Creates and mines the first block of a ledger
    pub fn genesis(coinbase: Transaction, pow: &ProofOfWork) -> Result<Self, PowError> {
        Block::seal(vec![coinbase], Vec::new(), pow)
    }

    /// Digest over the concatenated ids of all transactions, in order
    pub fn hash_transactions(&self) -> Hash {
        let ids: Vec<u8> = self
            .transactions
            .iter()
            .flat_map(|tx| tx.id.iter().copied())
            .collect();

        crypto::sha256(&ids)
    }

    /// Header bytes without the trailing nonce
    ///
    /// Mining computes this once and appends each candidate nonce.
    pub fn header_prefix(&self, target_bits: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.prev_hash.len() + 48 + 8);
        data.extend_from_slice(&self.prev_hash);
        data.extend_from_slice(&self.hash_transactions());
        data.extend_from_slice(&crypto::int_to_bytes(self.timestamp));
        data.extend_from_slice(&crypto::int_to_bytes(i64::from(target_bits)));
        data
    }

    /// The exact bytes hashed by proof-of-work for `nonce`
    pub fn header_bytes(&self, nonce: u64, target_bits: u32) -> Vec<u8> {
        let mut data = self.header_prefix(target_bits);
        data.extend_from_slice(&crypto::int_to_bytes(nonce as i64));
        data
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_empty()
    }

    pub fn hash_hex(&self) -> String {
        crypto::to_hex(&self.hash)
    }

    /// Creation time, if the stored timestamp is representable
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::SUBSIDY;

    fn fixed_block(prev_hash: Vec<u8>, pow: &ProofOfWork) -> Block {
        let mut block = Block {
            timestamp: 1_700_000_000,
            transactions: vec![Transaction::new_coinbase("alice", "fixed", SUBSIDY).unwrap()],
            prev_hash,
            hash: Vec::new(),
            nonce: 0,
        };
        let (nonce, hash) = pow.mine(&block).unwrap();
        block.nonce = nonce;
        block.hash = hash.to_vec();
        block
    }

    #[test]
    fn test_seal_produces_valid_block() {
        let pow = ProofOfWork::new(8).unwrap();
        let coinbase = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();

        let block = Block::genesis(coinbase, &pow).unwrap();

        assert!(block.is_genesis());
        assert_eq!(block.hash.len(), 32);
        assert!(pow.validate(&block));

        let digest = crypto::sha256(&block.header_bytes(block.nonce, pow.target_bits()));
        assert_eq!(digest.to_vec(), block.hash);
        assert!(digest < *pow.target());
    }

    #[test]
    fn test_header_bytes_layout() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = fixed_block(vec![7; 32], &pow);

        let bytes = block.header_bytes(5, 24);
        assert_eq!(bytes.len(), 32 + 32 + 8 + 8 + 8);
        assert_eq!(&bytes[..32], &[7u8; 32]);
        assert_eq!(&bytes[32..64], &block.hash_transactions());
        assert_eq!(&bytes[64..72], &1_700_000_000i64.to_be_bytes());
        assert_eq!(&bytes[72..80], &24i64.to_be_bytes());
        assert_eq!(&bytes[80..], &5i64.to_be_bytes());

        // Same fields, same bytes.
        assert_eq!(bytes, block.clone().header_bytes(5, 24));
    }

    #[test]
    fn test_hash_transactions_depends_on_order() {
        let a = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();
        let b = Transaction::new_coinbase("bob", "", SUBSIDY).unwrap();
        let mut block = Block {
            timestamp: 0,
            transactions: vec![a.clone(), b.clone()],
            prev_hash: Vec::new(),
            hash: Vec::new(),
            nonce: 0,
        };
        let forward = block.hash_transactions();
        block.transactions = vec![b, a];
        assert_ne!(forward, block.hash_transactions());
    }

    #[test]
    fn test_tampering_invalidates_block() {
        let pow = ProofOfWork::new(16).unwrap();
        let block = fixed_block(vec![3; 32], &pow);
        assert!(pow.validate(&block));

        let mut tampered = block.clone();
        tampered.timestamp += 1;
        assert!(!pow.validate(&tampered));

        let mut tampered = block.clone();
        tampered.prev_hash[0] ^= 0x01;
        assert!(!pow.validate(&tampered));

        let mut tampered = block.clone();
        tampered.transactions[0].id[31] ^= 0x80;
        assert!(!pow.validate(&tampered));

        let mut tampered = block;
        tampered.transactions[0].outputs[0].value = 1_000;
        tampered.transactions[0].id = tampered.transactions[0].compute_id().unwrap().to_vec();
        assert!(!pow.validate(&tampered));
    }

    #[test]
    fn test_block_encoding_round_trip() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = fixed_block(vec![9; 32], &pow);

        let bytes = crypto::encode(&block).unwrap();
        let decoded: Block = crypto::decode(&bytes).unwrap();

        assert_eq!(decoded, block);
        assert!(pow.validate(&decoded));
    }

    #[test]
    fn test_created_at() {
        let block = Block {
            timestamp: 0,
            transactions: Vec::new(),
            prev_hash: Vec::new(),
            hash: Vec::new(),
            nonce: 0,
        };
        assert_eq!(block.created_at().unwrap().to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }
}
