//! Chain data types: blocks, transactions, receipts, logs.
//!
//! Hashes and addresses are carried as `0x`-prefixed hex strings exactly as
//! the node reports them. Monetary amounts (`value`, `tx_fee`, `rewards`) are
//! decimal strings because they routinely exceed `u64`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An event log emitted during transaction execution.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Log {
    /// Emitting contract address.
    pub address: String,
    /// Indexed topics, first one is the event signature.
    pub topics: Vec<String>,
    /// Non-indexed data as hex.
    pub data: String,
    /// Position of the log within its block.
    pub log_index: u64,
}

/// A decoded contract call: method name plus named arguments.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DecodedCall {
    pub method: String,
    pub arguments: BTreeMap<String, String>,
}

/// Execution result of a single transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Receipt {
    pub transaction_hash: String,
    pub gas_used: u64,
    /// 1 on success, 0 on revert.
    pub status: u8,
    /// Set when the transaction created a contract.
    pub contract_address: Option<String>,
    pub logs: Vec<Log>,
    /// Post-state root, empty for post-byzantium style receipts.
    pub root: String,
}

/// A transaction as stored by the explorer.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub block_hash: String,
    /// Position of the transaction within its block.
    pub transaction_index: u64,
    pub nonce: u64,
    pub from: String,
    pub to: String,
    pub contract_address: Option<String>,
    pub value: String,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub tx_fee: String,
    pub status: u8,
    pub input_data: String,
    pub decoded_input: Option<DecodedCall>,
    pub logs: Vec<Log>,
    pub root: String,
    /// Block timestamp (Unix seconds).
    pub time: u64,
}

impl Transaction {
    /// Merge execution results from a receipt into this transaction and
    /// derive the fee from the gas actually used.
    pub fn apply_receipt(&mut self, receipt: &Receipt) {
        self.logs = receipt.logs.clone();
        self.root = receipt.root.clone();
        self.status = receipt.status;
        self.gas_used = receipt.gas_used;
        self.contract_address = receipt.contract_address.clone();
        self.tx_fee = (u128::from(self.gas_price) * u128::from(receipt.gas_used)).to_string();
    }

    /// Whether `address` is the sender or the recipient.
    pub fn involves(&self, address: &str) -> bool {
        self.from.eq_ignore_ascii_case(address) || self.to.eq_ignore_ascii_case(address)
    }
}

/// A block with its transactions and receipts.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub proposer_address: String,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub rewards: String,
    /// Number of transactions. Kept separately from `txs` because summaries
    /// carry the count without the bodies.
    pub tx_count: u64,
    pub txs: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
}

impl Block {
    /// A copy of this block with transaction and receipt bodies stripped.
    pub fn summary(&self) -> Block {
        Block {
            txs: Vec::new(),
            receipts: Vec::new(),
            ..self.clone()
        }
    }

    /// Apply each receipt to the transaction it names. Receipts without a
    /// matching transaction are ignored. Returns the number applied.
    pub fn merge_receipts(&mut self) -> usize {
        let mut applied = 0;
        for receipt in &self.receipts {
            if let Some(tx) = self
                .txs
                .iter_mut()
                .find(|tx| tx.hash == receipt.transaction_hash)
            {
                tx.apply_receipt(receipt);
                applied += 1;
            }
        }
        applied
    }
}

/// A validator as reported by the node.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Validator {
    pub address: String,
    pub smc_address: String,
    pub name: String,
    pub role: u8,
    pub staked_amount: String,
}
