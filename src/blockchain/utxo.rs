//! UTXO queries over the ledger.
//!
//! Every query rescans the chain from the tip back to genesis. Spent
//! outputs are collected on the way down, so an output is known to be spent
//! before the older transaction that created it is reached.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use super::block::Block;
use super::chain::{Blockchain, BlockchainError};
use super::crypto;
use super::transaction::{SpendableOutputs, Transaction, TxInput, TxOutput};

impl Blockchain {
    /// Transactions with at least one unspent output locked to `address`,
    /// paired with the indices of those outputs, newest first
    fn scan_unspent(
        &self,
        address: &str,
    ) -> Result<Vec<(Transaction, Vec<u32>)>, BlockchainError> {
        let mut spent: HashMap<String, HashSet<u32>> = HashMap::new();
        let mut unspent = Vec::new();

        for block in self.iterator() {
            let block: Block = block?;

            // Later transactions in a block may spend earlier ones.
            for tx in block.transactions.into_iter().rev() {
                let spent_here = spent.get(&tx.id_hex());
                let indices: Vec<u32> = tx
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(idx, out)| (idx as u32, out))
                    .filter(|(idx, _)| !spent_here.is_some_and(|outs| outs.contains(idx)))
                    .filter(|(_, out)| out.can_be_unlocked_with(address))
                    .map(|(idx, _)| idx)
                    .collect();

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        if let TxInput::Spend {
                            prev_tx_id,
                            output_index,
                            ..
                        } = input
                        {
                            if input.can_unlock_output_with(address) {
                                spent
                                    .entry(crypto::to_hex(prev_tx_id))
                                    .or_default()
                                    .insert(*output_index);
                            }
                        }
                    }
                }

                if !indices.is_empty() {
                    unspent.push((tx, indices));
                }
            }
        }

        Ok(unspent)
    }

    /// Finds transactions holding unspent outputs for `address`
    ///
    /// Each transaction appears once, in newest-first ledger order.
    pub fn find_unspent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<Transaction>, BlockchainError> {
        Ok(self
            .scan_unspent(address)?
            .into_iter()
            .map(|(tx, _)| tx)
            .collect())
    }

    /// Finds all unspent outputs locked to `address`
    pub fn find_utxo(&self, address: &str) -> Result<Vec<TxOutput>, BlockchainError> {
        let mut utxos = Vec::new();
        for (tx, indices) in self.scan_unspent(address)? {
            utxos.extend(indices.iter().map(|&idx| tx.outputs[idx as usize].clone()));
        }
        Ok(utxos)
    }

    /// Sum of the unspent outputs locked to `address`
    ///
    /// Fails with a value-overflow error if the sum does not fit in a `u64`.
    pub fn get_balance(&self, address: &str) -> Result<u64, BlockchainError> {
        self.find_utxo(address)?
            .iter()
            .try_fold(0u64, |total, out| add_value(total, out.value, address))
    }

    /// Greedily selects unspent outputs of `address` worth at least `amount`
    ///
    /// Outputs are taken in ledger traversal order until the running total
    /// reaches `amount`; no attempt is made to minimise the number of inputs.
    ///
    /// # Returns
    ///
    /// The accumulated value and the chosen output indices per hex
    /// transaction id. The total is below `amount` when funds are short.
    pub fn find_spendable_outputs(
        &self,
        address: &str,
        amount: u64,
    ) -> Result<SpendableOutputs, BlockchainError> {
        let mut unspent_outputs: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut accumulated = 0u64;

        'work: for (tx, indices) in self.scan_unspent(address)? {
            let txid = tx.id_hex();
            for idx in indices {
                if accumulated >= amount {
                    break 'work;
                }
                accumulated = add_value(accumulated, tx.outputs[idx as usize].value, address)?;
                unspent_outputs.entry(txid.clone()).or_default().push(idx);
            }
        }

        debug!(
            "Selected {} of {} requested from {}",
            accumulated, amount, address
        );
        Ok((accumulated, unspent_outputs))
    }

    /// Builds a payment of `amount` from `from` to `to`
    ///
    /// Fails with an insufficient-funds error, without touching the ledger,
    /// when `from` cannot cover `amount`.
    pub fn build_transaction(
        &self,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<Transaction, BlockchainError> {
        let spendable = self.find_spendable_outputs(from, amount)?;
        Ok(Transaction::new_utxo_transaction(from, to, amount, spendable)?)
    }

    /// Builds a payment and mines it into a new block
    pub fn send(&mut self, from: &str, to: &str, amount: u64) -> Result<Block, BlockchainError> {
        let tx = self.build_transaction(from, to, amount)?;
        self.mine_block(vec![tx])
    }
}

fn add_value(total: u64, value: u64, address: &str) -> Result<u64, BlockchainError> {
    total.checked_add(value).ok_or_else(|| {
        BlockchainError::ValueOverflow(format!("unspent outputs of '{}' exceed u64", address))
    })
}
