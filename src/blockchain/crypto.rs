use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Width in bytes of every digest produced by this module
pub const HASH_SIZE: usize = 32;

/// A fixed-width SHA-256 digest
pub type Hash = [u8; HASH_SIZE];

/// Errors that can occur while encoding or decoding ledger records
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Invalid hex string: {0}")]
    HexError(#[from] hex::FromHexError),
}

/// Computes the SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encodes a signed integer as 8 big-endian bytes
///
/// The width is fixed so header bytes stay identical across platforms.
pub fn int_to_bytes(num: i64) -> [u8; 8] {
    num.to_be_bytes()
}

/// Serializes a record into its stored byte form
///
/// # Arguments
///
/// * `value` - The record to encode
///
/// # Returns
///
/// The bincode encoding of the record
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    bincode::serialize(value).map_err(|e| EncodingError::SerializationError(e.to_string()))
}

/// Deserializes a record previously produced by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EncodingError> {
    bincode::deserialize(bytes).map_err(|e| EncodingError::DeserializationError(e.to_string()))
}

/// Renders bytes as lowercase hex
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parses a hex string back into bytes
pub fn from_hex(s: &str) -> Result<Vec<u8>, EncodingError> {
    Ok(hex::decode(s)?)
}
