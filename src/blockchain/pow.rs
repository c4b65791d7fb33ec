use std::time::Instant;

use log::{debug, info};
use thiserror::Error;

use super::block::Block;
use super::crypto::{self, Hash, HASH_SIZE};

/// Default difficulty: leading zero bits required of a block hash
pub const TARGET_BITS: u32 = 24;

/// Upper bound of the nonce search
pub const MAX_NONCE: u64 = i64::MAX as u64;

/// Errors that can occur while mining
#[derive(Debug, Error)]
pub enum PowError {
    #[error("Invalid target bits: {0} (expected 1..=255)")]
    InvalidTargetBits(u32),

    #[error("Nonce space exhausted after {attempts} attempts")]
    ExhaustedSearch { attempts: u64 },
}

/// Proof-of-work engine with a fixed target
///
/// A block is accepted when the SHA-256 digest of its header bytes, read as
/// a big-endian 256-bit unsigned integer, is strictly below
/// `1 << (256 - target_bits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    target_bits: u32,
    target: Hash,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork {
            target_bits: TARGET_BITS,
            target: target_for(TARGET_BITS),
        }
    }
}

impl ProofOfWork {
    /// Creates an engine for the given difficulty
    pub fn new(target_bits: u32) -> Result<Self, PowError> {
        if target_bits == 0 || target_bits >= 256 {
            return Err(PowError::InvalidTargetBits(target_bits));
        }

        Ok(ProofOfWork {
            target_bits,
            target: target_for(target_bits),
        })
    }

    pub fn target_bits(&self) -> u32 {
        self.target_bits
    }

    /// The target as 32 big-endian bytes
    pub fn target(&self) -> &Hash {
        &self.target
    }

    /// Whether a digest is strictly below the target
    pub fn meets_target(&self, digest: &Hash) -> bool {
        // Lexicographic order on fixed-width big-endian bytes is numeric order.
        digest < &self.target
    }

    /// Searches for the first nonce whose header digest meets the target
    ///
    /// # Arguments
    ///
    /// * `block` - The candidate block; its `nonce` and `hash` are ignored
    ///
    /// # Returns
    ///
    /// The winning nonce and the matching digest
    pub fn mine(&self, block: &Block) -> Result<(u64, Hash), PowError> {
        self.mine_within(block, MAX_NONCE)
    }

    fn mine_within(&self, block: &Block, max_nonce: u64) -> Result<(u64, Hash), PowError> {
        info!(
            "Mining a block with {} transaction(s) at difficulty {}",
            block.transactions.len(),
            self.target_bits
        );

        let started = Instant::now();
        let prefix = block.header_prefix(self.target_bits);
        let mut data = Vec::with_capacity(prefix.len() + 8);

        let mut nonce = 0u64;
        while nonce < max_nonce {
            data.clear();
            data.extend_from_slice(&prefix);
            data.extend_from_slice(&crypto::int_to_bytes(nonce as i64));

            let hash = crypto::sha256(&data);
            if self.meets_target(&hash) {
                info!(
                    "Mined block {} (nonce {}, {:.2?})",
                    crypto::to_hex(&hash),
                    nonce,
                    started.elapsed()
                );
                return Ok((nonce, hash));
            }

            if nonce > 0 && nonce % 1_000_000 == 0 {
                debug!("Still mining: {} attempts, {:.2?}", nonce, started.elapsed());
            }
            nonce += 1;
        }

        Err(PowError::ExhaustedSearch { attempts: nonce })
    }

    /// Checks a sealed block against the target using its stored nonce
    ///
    /// Linkage and transaction contents are not examined here.
    pub fn validate(&self, block: &Block) -> bool {
        let hash = crypto::sha256(&block.header_bytes(block.nonce, self.target_bits));
        self.meets_target(&hash)
    }
}

/// `1 << (256 - bits)` as big-endian bytes
fn target_for(bits: u32) -> Hash {
    let shift = (256 - bits) as usize;
    let mut target = [0u8; HASH_SIZE];
    target[HASH_SIZE - 1 - shift / 8] = 1 << (shift % 8);
    target
}
