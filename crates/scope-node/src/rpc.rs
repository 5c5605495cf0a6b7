//! JSON-RPC client for the chain node.
//!
//! Speaks JSON-RPC 2.0 over HTTP via `reqwest`. Node responses use camelCase
//! field names and are converted into the explorer's own types at the edge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use scope_core::error::RpcError;
use scope_core::traits::NodeClient;
use scope_core::types::{Block, Log, Receipt, Transaction, Validator};

// --- Method names ---

const METHOD_BLOCK_NUMBER: &str = "kai_blockNumber";
const METHOD_BLOCK_BY_NUMBER: &str = "kai_getBlockByNumber";
const METHOD_BLOCK_BY_HASH: &str = "kai_getBlockByHash";
const METHOD_TRANSACTION: &str = "tx_getTransaction";
const METHOD_RECEIPT: &str = "tx_getTransactionReceipt";
const METHOD_VALIDATORS: &str = "kai_validators";

/// Describe a transport failure without echoing the endpoint URL.
fn sanitize_network_error(error: &reqwest::Error) -> String {
    if error.is_connect() {
        "connection refused or unreachable".to_string()
    } else if error.is_timeout() {
        "connection timed out".to_string()
    } else if error.is_decode() {
        "response decode error".to_string()
    } else if error.is_body() {
        "response body error".to_string()
    } else {
        "request failed".to_string()
    }
}

pub struct RpcClient {
    client: Client,
    endpoint: String,
}

impl RpcClient {
    /// Build a client for `endpoint` whose requests give up after `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| RpcError::Transport(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue a call and decode its `result`. A `null` result is
    /// [`RpcError::NotFound`].
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let resp: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(sanitize_network_error(&e)))?
            .json()
            .await
            .map_err(|e| RpcError::Decode(sanitize_network_error(&e)))?;

        parse_response(method, &params, resp)
    }
}

/// Split a JSON-RPC response envelope into the typed result or an error.
fn parse_response<T: DeserializeOwned>(method: &str, params: &Value, mut resp: Value) -> Result<T, RpcError> {
    if let Some(err) = resp.get("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(RpcError::Node { code, message });
    }
    let result = resp.get_mut("result").map(Value::take).unwrap_or(Value::Null);
    if result.is_null() {
        return Err(RpcError::NotFound(format!("{method} {params}")));
    }
    serde_json::from_value(result).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
}

// --- Wire types ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireLog {
    address: String,
    topics: Vec<String>,
    data: String,
    log_index: u64,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireReceipt {
    transaction_hash: String,
    gas_used: u64,
    status: u8,
    contract_address: Option<String>,
    logs: Vec<WireLog>,
    root: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireTransaction {
    hash: String,
    block_number: u64,
    block_hash: String,
    transaction_index: u64,
    nonce: u64,
    from: String,
    to: String,
    value: String,
    gas_price: u64,
    gas: u64,
    input: String,
    time: u64,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireBlock {
    height: u64,
    hash: String,
    last_block: String,
    proposer_address: String,
    time: u64,
    gas_used: u64,
    gas_limit: u64,
    rewards: String,
    num_txs: u64,
    txs: Vec<WireTransaction>,
    receipts: Vec<WireReceipt>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireValidator {
    address: String,
    smc_address: String,
    name: String,
    role: u8,
    staked_amount: String,
}

impl From<WireLog> for Log {
    fn from(w: WireLog) -> Self {
        Log {
            address: w.address,
            topics: w.topics,
            data: w.data,
            log_index: w.log_index,
        }
    }
}

impl From<WireReceipt> for Receipt {
    fn from(w: WireReceipt) -> Self {
        Receipt {
            transaction_hash: w.transaction_hash,
            gas_used: w.gas_used,
            status: w.status,
            contract_address: w.contract_address.filter(|a| !a.is_empty()),
            logs: w.logs.into_iter().map(Log::from).collect(),
            root: w.root,
        }
    }
}

impl From<WireTransaction> for Transaction {
    fn from(w: WireTransaction) -> Self {
        Transaction {
            hash: w.hash,
            block_number: w.block_number,
            block_hash: w.block_hash,
            transaction_index: w.transaction_index,
            nonce: w.nonce,
            from: w.from,
            to: w.to,
            value: w.value,
            gas_price: w.gas_price,
            gas_limit: w.gas,
            input_data: w.input,
            time: w.time,
            ..Transaction::default()
        }
    }
}

impl From<WireBlock> for Block {
    fn from(w: WireBlock) -> Self {
        let time = w.time;
        let txs: Vec<Transaction> = w
            .txs
            .into_iter()
            .map(|tx| Transaction {
                time,
                ..Transaction::from(tx)
            })
            .collect();
        Block {
            height: w.height,
            hash: w.hash,
            parent_hash: w.last_block,
            proposer_address: w.proposer_address,
            timestamp: time,
            gas_used: w.gas_used,
            gas_limit: w.gas_limit,
            rewards: w.rewards,
            tx_count: w.num_txs.max(txs.len() as u64),
            txs,
            receipts: w.receipts.into_iter().map(Receipt::from).collect(),
        }
    }
}

impl From<WireValidator> for Validator {
    fn from(w: WireValidator) -> Self {
        Validator {
            address: w.address,
            smc_address: w.smc_address,
            name: w.name,
            role: w.role,
            staked_amount: w.staked_amount,
        }
    }
}

#[async_trait]
impl NodeClient for RpcClient {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        self.call(METHOD_BLOCK_NUMBER, json!([])).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, RpcError> {
        let block: WireBlock = self.call(METHOD_BLOCK_BY_HASH, json!([hash])).await?;
        Ok(block.into())
    }

    async fn block_by_height(&self, height: u64) -> Result<Block, RpcError> {
        let block: WireBlock = self.call(METHOD_BLOCK_BY_NUMBER, json!([height])).await?;
        Ok(block.into())
    }

    async fn transaction(&self, hash: &str) -> Result<Transaction, RpcError> {
        let tx: WireTransaction = self.call(METHOD_TRANSACTION, json!([hash])).await?;
        Ok(tx.into())
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Receipt, RpcError> {
        let receipt: WireReceipt = self.call(METHOD_RECEIPT, json!([hash])).await?;
        Ok(receipt.into())
    }

    async fn validators(&self) -> Result<Vec<Validator>, RpcError> {
        let validators: Vec<WireValidator> = self.call(METHOD_VALIDATORS, json!([])).await?;
        Ok(validators.into_iter().map(Validator::from).collect())
    }
}
