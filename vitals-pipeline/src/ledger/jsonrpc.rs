//! Ethereum JSON-RPC ledger.
//!
//! Anchors a hash by calling `storeReading(bytes32)` on a hash storage
//! contract through `eth_sendTransaction`. The sending account is managed by
//! the node (unlocked account or external signer); this client never holds
//! keys.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::*;

/// Selector of `storeReading(bytes32)`: first four bytes of its keccak-256.
const STORE_READING_SELECTOR: &str = "0c5c029a";

/// Configuration for the JSON-RPC ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcLedgerConfig {
    /// Node RPC endpoint
    pub rpc_url: String,
    /// Hash storage contract address
    pub contract_address: String,
    /// Sending account address
    pub from_address: String,
    /// Gas limit; left to the node's estimate when unset
    #[serde(default)]
    pub gas: Option<u64>,
    /// Per-request HTTP timeout (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Wait until the transaction is mined before acknowledging
    #[serde(default = "default_true")]
    pub wait_for_receipt: bool,
    /// Delay between receipt polls (ms)
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    /// Receipt polls before giving up
    #[serde(default = "default_receipt_max_polls")]
    pub receipt_max_polls: u32,
}

fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_true() -> bool { true }
fn default_receipt_poll_interval_ms() -> u64 { 2_000 }
fn default_receipt_max_polls() -> u32 { 90 }

impl JsonRpcLedgerConfig {
    /// Config with default timing for an endpoint, contract and sender.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            from_address: from_address.into(),
            gas: None,
            request_timeout_ms: default_request_timeout_ms(),
            wait_for_receipt: true,
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_max_polls: default_receipt_max_polls(),
        }
    }
}

/// JSON-RPC backed ledger client.
pub struct JsonRpcLedger {
    client: Client,
    config: JsonRpcLedgerConfig,
    ledger_id: String,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    /// Create a new client.
    pub fn new(config: JsonRpcLedgerConfig) -> Result<Self, LedgerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("HTTP client: {}", e)))?;

        let ledger_id = format!("{}@{}", config.contract_address, config.rpc_url);

        Ok(Self {
            client,
            config,
            ledger_id,
            next_id: AtomicU64::new(1),
        })
    }

    /// Calldata for `storeReading(bytes32)`.
    pub fn encode_call(hex_hash: &str) -> Result<String, LedgerError> {
        let digest = parse_hash(hex_hash)?;
        Ok(format!("0x{}{}", STORE_READING_SELECTOR, hex::encode(digest)))
    }

    /// Perform one JSON-RPC call.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::ParseError(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(body.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::ParseError(format!("{}: {}", method, e)))
    }

    /// Poll until the transaction is mined.
    async fn await_receipt(&self, tx_hash: &str) -> Result<LedgerReceipt, LedgerError> {
        let interval = Duration::from_millis(self.config.receipt_poll_interval_ms);

        for attempt in 0..self.config.receipt_max_polls {
            let receipt: Option<TransactionReceipt> = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            match receipt {
                Some(receipt) if receipt.status.as_deref() == Some("0x0") => {
                    return Err(LedgerError::Reverted(tx_hash.to_string()));
                }
                Some(receipt) => {
                    let block_number = receipt
                        .block_number
                        .as_deref()
                        .and_then(|b| u64::from_str_radix(b.trim_start_matches("0x"), 16).ok());
                    return Ok(LedgerReceipt {
                        ledger_reference: tx_hash.to_string(),
                        block_number,
                    });
                }
                None => {
                    debug!(tx = %tx_hash, attempt, "Receipt not yet available");
                    tokio::time::sleep(interval).await;
                }
            }
        }

        warn!(tx = %tx_hash, polls = self.config.receipt_max_polls, "Gave up waiting for receipt");
        Err(LedgerError::ReceiptTimeout(tx_hash.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    fn id(&self) -> &str {
        &self.ledger_id
    }

    async fn is_available(&self) -> bool {
        self.call::<String>("eth_chainId", json!([])).await.is_ok()
    }

    async fn submit_hash(&self, hex_hash: &str) -> Result<LedgerReceipt, LedgerError> {
        let data = Self::encode_call(hex_hash)?;

        let mut tx = json!({
            "from": self.config.from_address,
            "to": self.config.contract_address,
            "data": data,
        });
        if let Some(gas) = self.config.gas {
            tx["gas"] = Value::String(format!("0x{:x}", gas));
        }

        let tx_hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        info!(tx = %tx_hash, hash = %hex_hash, "Anchor transaction sent");

        if !self.config.wait_for_receipt {
            return Ok(LedgerReceipt::new(tx_hash));
        }

        self.await_receipt(&tx_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call() {
        let hash = "ab".repeat(32);
        let data = JsonRpcLedger::encode_call(&hash).unwrap();
        assert_eq!(data, format!("0x0c5c029a{}", hash));
        assert_eq!(data.len(), 2 + 8 + 64);
    }

    #[test]
    fn test_ledger_id() {
        let ledger = JsonRpcLedger::new(JsonRpcLedgerConfig::new(
            "http://localhost:8545",
            "0xcontract",
            "0xsender",
        ))
        .unwrap();
        assert_eq!(ledger.id(), "0xcontract@http://localhost:8545");
    }

    #[test]
    fn test_config_defaults_from_toml_like_json() {
        let config: JsonRpcLedgerConfig = serde_json::from_value(json!({
            "rpc_url": "http://localhost:8545",
            "contract_address": "0xc",
            "from_address": "0xf",
        }))
        .unwrap();
        assert!(config.wait_for_receipt);
        assert_eq!(config.receipt_max_polls, 90);
        assert_eq!(config.gas, None);
    }
}
