use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::{self, EncodingError};

/// Value minted by every coinbase transaction unless configured otherwise
pub const SUBSIDY: u64 = 10;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Encoding error: {0}")]
    EncodingError(#[from] EncodingError),
}

/// Spendable outputs selected for a payment: the accumulated value and, per
/// hex transaction id, the indices of the chosen outputs
pub type SpendableOutputs = (u64, BTreeMap<String, Vec<u32>>);

/// A transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxInput {
    /// Consumes output `output_index` of transaction `prev_tx_id`
    Spend {
        prev_tx_id: Vec<u8>,
        output_index: u32,
        authorization: String,
    },

    /// The single input of a minting transaction; `memo` is free text
    Coinbase { memo: String },
}

impl TxInput {
    /// Id of the referenced transaction, empty for a coinbase input
    pub fn prev_tx_id(&self) -> &[u8] {
        match self {
            TxInput::Spend { prev_tx_id, .. } => prev_tx_id.as_slice(),
            TxInput::Coinbase { .. } => &[],
        }
    }

    /// Index of the referenced output, `-1` for a coinbase input
    pub fn output_index(&self) -> i64 {
        match self {
            TxInput::Spend { output_index, .. } => i64::from(*output_index),
            TxInput::Coinbase { .. } => -1,
        }
    }

    /// The authorization string, or the memo of a coinbase input
    pub fn authorization(&self) -> &str {
        match self {
            TxInput::Spend { authorization, .. } => authorization.as_str(),
            TxInput::Coinbase { memo } => memo.as_str(),
        }
    }

    /// Whether this input was authorized with `unlocking_data`
    pub fn can_unlock_output_with(&self, unlocking_data: &str) -> bool {
        self.authorization() == unlocking_data
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount carried by the output
    pub value: u64,

    /// Whoever presents this exact string may spend the output
    pub lock: String,
}

impl TxOutput {
    pub fn new(value: u64, lock: &str) -> Self {
        TxOutput {
            value,
            lock: lock.to_string(),
        }
    }

    /// Whether `unlocking_data` opens this output's lock
    pub fn can_be_unlocked_with(&self, unlocking_data: &str) -> bool {
        self.lock == unlocking_data
    }
}

/// Represents a transaction in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Digest of the serialized inputs and outputs
    pub id: Vec<u8>,

    /// Outputs consumed by this transaction
    pub inputs: Vec<TxInput>,

    /// Outputs created by this transaction
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Creates a transaction from its inputs and outputs and assigns its id
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Result<Self, TransactionError> {
        let mut tx = Transaction {
            id: Vec::new(),
            inputs,
            outputs,
        };
        tx.id = tx.compute_id()?.to_vec();
        Ok(tx)
    }

    /// Creates a new coinbase transaction
    ///
    /// # Arguments
    ///
    /// * `to` - The lock of the minted output
    /// * `memo` - Free text carried by the input; an empty memo is replaced
    ///   by a reward note
    /// * `subsidy` - The minted value
    ///
    /// # Returns
    ///
    /// A new Transaction instance
    pub fn new_coinbase(to: &str, memo: &str, subsidy: u64) -> Result<Self, TransactionError> {
        let memo = if memo.is_empty() {
            format!("Reward to '{}'", to)
        } else {
            memo.to_string()
        };

        Transaction::new(
            vec![TxInput::Coinbase { memo }],
            vec![TxOutput::new(subsidy, to)],
        )
    }

    /// Builds a payment from outputs already selected as spendable
    ///
    /// # Arguments
    ///
    /// * `from` - The payer; authorizes every input and receives the change
    /// * `to` - The payee
    /// * `amount` - The value to transfer
    /// * `spendable` - Result of a spendable-output search for `from`
    ///
    /// # Returns
    ///
    /// The new transaction, or `InsufficientFunds` if the selection falls short
    pub fn new_utxo_transaction(
        from: &str,
        to: &str,
        amount: u64,
        spendable: SpendableOutputs,
    ) -> Result<Self, TransactionError> {
        if amount == 0 {
            return Err(TransactionError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        let (accumulated, valid_outputs) = spendable;
        if accumulated < amount {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = Vec::new();
        for (txid, outs) in valid_outputs {
            let prev_tx_id = crypto::from_hex(&txid)?;
            for output_index in outs {
                inputs.push(TxInput::Spend {
                    prev_tx_id: prev_tx_id.clone(),
                    output_index,
                    authorization: from.to_string(),
                });
            }
        }

        let mut outputs = vec![TxOutput::new(amount, to)];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, from));
        }

        Transaction::new(inputs, outputs)
    }

    /// Computes the id over inputs and outputs; the `id` field is excluded
    pub fn compute_id(&self) -> Result<crypto::Hash, TransactionError> {
        let preimage = crypto::encode(&(&self.inputs, &self.outputs))?;
        Ok(crypto::sha256(&preimage))
    }

    /// Checks if the transaction is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_id().is_empty()
            && self.inputs[0].output_index() == -1
    }

    /// The id as a hex string, used as a map key by UTXO queries
    pub fn id_hex(&self) -> String {
        crypto::to_hex(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(entries: &[(&Transaction, &[u32])], accumulated: u64) -> SpendableOutputs {
        let mut map = BTreeMap::new();
        for (tx, outs) in entries {
            map.insert(tx.id_hex(), outs.to_vec());
        }
        (accumulated, map)
    }

    #[test]
    fn test_coinbase_transaction() {
        let tx = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].authorization(), "Reward to 'alice'");
        assert_eq!(tx.outputs, vec![TxOutput::new(10, "alice")]);
        assert_eq!(tx.id.len(), 32);
    }

    #[test]
    fn test_id_is_deterministic_and_content_bound() {
        let a = Transaction::new_coinbase("alice", "memo", SUBSIDY).unwrap();
        let b = Transaction::new_coinbase("alice", "memo", SUBSIDY).unwrap();
        let c = Transaction::new_coinbase("bob", "memo", SUBSIDY).unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.compute_id().unwrap().to_vec(), a.id);
    }

    #[test]
    fn test_utxo_transaction_with_change() {
        let funding = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();
        let tx = Transaction::new_utxo_transaction(
            "alice",
            "bob",
            4,
            selection(&[(&funding, &[0])], 10),
        )
        .unwrap();

        assert!(!tx.is_coinbase());
        assert_eq!(
            tx.inputs,
            vec![TxInput::Spend {
                prev_tx_id: funding.id.clone(),
                output_index: 0,
                authorization: "alice".to_string(),
            }]
        );
        assert_eq!(
            tx.outputs,
            vec![TxOutput::new(4, "bob"), TxOutput::new(6, "alice")]
        );
    }

    #[test]
    fn test_utxo_transaction_exact_amount_has_no_change() {
        let funding = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();
        let tx = Transaction::new_utxo_transaction(
            "alice",
            "bob",
            10,
            selection(&[(&funding, &[0])], 10),
        )
        .unwrap();

        assert_eq!(tx.outputs, vec![TxOutput::new(10, "bob")]);
    }

    #[test]
    fn test_insufficient_funds() {
        let funding = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();
        let result = Transaction::new_utxo_transaction(
            "alice",
            "bob",
            11,
            selection(&[(&funding, &[0])], 10),
        );

        assert!(matches!(
            result,
            Err(TransactionError::InsufficientFunds {
                required: 11,
                available: 10
            })
        ));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let result = Transaction::new_utxo_transaction("alice", "bob", 0, (0, BTreeMap::new()));
        assert!(matches!(result, Err(TransactionError::InvalidAmount(_))));
    }

    #[test]
    fn test_spend_input_is_never_coinbase() {
        // A lone spend of output 0 from an empty id still has a real index.
        let tx = Transaction::new(
            vec![TxInput::Spend {
                prev_tx_id: Vec::new(),
                output_index: 0,
                authorization: "alice".to_string(),
            }],
            vec![TxOutput::new(1, "bob")],
        )
        .unwrap();
        assert!(!tx.is_coinbase());

        let coinbase = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();
        let mut doubled = coinbase.clone();
        doubled.inputs.push(coinbase.inputs[0].clone());
        assert!(!doubled.is_coinbase());
    }

    #[test]
    fn test_unlock_is_exact_string_match() {
        let output = TxOutput::new(5, "alice");
        assert!(output.can_be_unlocked_with("alice"));
        assert!(!output.can_be_unlocked_with("Alice"));

        let input = TxInput::Spend {
            prev_tx_id: vec![1; 32],
            output_index: 0,
            authorization: "alice".to_string(),
        };
        assert!(input.can_unlock_output_with("alice"));
        assert!(!input.can_unlock_output_with("bob"));
    }

    #[test]
    fn test_transaction_encoding_round_trip() {
        let funding = Transaction::new_coinbase("alice", "", SUBSIDY).unwrap();
        let tx = Transaction::new_utxo_transaction(
            "alice",
            "bob",
            3,
            selection(&[(&funding, &[0])], 10),
        )
        .unwrap();

        let bytes = crypto::encode(&tx).unwrap();
        let decoded: Transaction = crypto::decode(&bytes).unwrap();
        assert_eq!(decoded, tx);
    }
}
