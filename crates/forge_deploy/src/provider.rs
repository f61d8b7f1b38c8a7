//! Provider seams — the signer and network-query interfaces the
//! orchestration layer consumes, plus the JSON-RPC query client.

use async_trait::async_trait;
use forge_core::{Address, Network, default_network_configs, validate_url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeployError;

/// A transaction to be signed and broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRequest {
    /// Recipient; `None` deploys raw bytecode.
    pub to: Option<Address>,
    /// Attached value in wei.
    pub value: u128,
    /// Calldata.
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price_gwei: u64,
}

/// A mined transaction receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    /// `true` if execution succeeded, `false` if it reverted.
    pub status: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

/// A wallet capable of signing and broadcasting transactions.
///
/// The signer is network-scoped: switching networks is itself a
/// serialization point, and callers must not issue concurrent submissions
/// while a switch is in flight.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Connect and return the signer's address.
    async fn connect(&self) -> Result<Address, DeployError>;

    /// The network the signer is currently on.
    async fn active_network(&self) -> Result<Network, DeployError>;

    /// Switch the signer to another network.
    async fn switch_network(&self, network: Network) -> Result<(), DeployError>;

    /// Sign and broadcast a transaction, returning its hash.
    async fn send_transaction(&self, request: TxRequest) -> Result<String, DeployError>;

    /// Native-currency balance of the signer, in wei.
    async fn get_balance(&self) -> Result<u128, DeployError>;
}

/// Read-only network state queries used by the transaction monitor.
#[async_trait]
pub trait NetworkQuery: Send + Sync {
    /// Receipt for a transaction, or `None` while it is unmined.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, DeployError>;

    /// The latest block number.
    async fn block_number(&self) -> Result<u64, DeployError>;
}

const RPC_TIMEOUT_SECS: u64 = 10;

/// JSON-RPC 2.0 [`NetworkQuery`] implementation.
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
}

impl RpcClient {
    /// Create a client against an explicit endpoint URL.
    pub fn new(url: impl Into<String>) -> Result<Self, DeployError> {
        let url = url.into();
        if !validate_url(&url) {
            return Err(DeployError::Rpc(format!("invalid RPC URL: {url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self { url, client })
    }

    /// Create a client against a network's default RPC endpoint.
    pub fn for_network(network: Network) -> Result<Self, DeployError> {
        let configs = default_network_configs();
        let config = configs
            .get(&network)
            .ok_or(DeployError::UnsupportedNetwork(network))?;
        Self::new(config.rpc_url.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, DeployError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!(url = %self.url, method, "rpc call");
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeployError::Rpc(format!("{method} request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(DeployError::Rpc(format!(
                "{method} returned HTTP {}",
                resp.status()
            )));
        }

        let envelope: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DeployError::Rpc(format!("{method} response unparseable: {e}")))?;

        if let Some(error) = envelope.get("error") {
            return Err(DeployError::Rpc(format!("{method} error: {error}")));
        }
        Ok(envelope.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl NetworkQuery for RpcClient {
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, DeployError> {
        let result = self
            .call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }

    async fn block_number(&self) -> Result<u64, DeployError> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| DeployError::Rpc("eth_blockNumber returned non-string".into()))?;
        parse_hex_u64(hex)
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_hex_u64(s: &str) -> Result<u64, DeployError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16)
        .map_err(|_| DeployError::Rpc(format!("invalid hex quantity: {s}")))
}

/// Decode an `eth_getTransactionReceipt` result object.
fn parse_receipt(value: &serde_json::Value) -> Result<TxReceipt, DeployError> {
    let field = |name: &str| -> Result<&str, DeployError> {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| DeployError::Rpc(format!("receipt missing field: {name}")))
    };

    let contract_address = match value.get("contractAddress").and_then(|v| v.as_str()) {
        Some(s) => Some(
            Address::from_hex(s)
                .map_err(|e| DeployError::Rpc(format!("bad contractAddress: {e}")))?,
        ),
        None => None,
    };

    Ok(TxReceipt {
        tx_hash: field("transactionHash")?.to_string(),
        block_number: parse_hex_u64(field("blockNumber")?)?,
        status: parse_hex_u64(field("status")?)? == 1,
        gas_used: parse_hex_u64(field("gasUsed")?)?,
        contract_address,
    })
}
