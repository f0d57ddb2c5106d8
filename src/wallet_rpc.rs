//! Payment bridge over Ethereum JSON-RPC.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::WalletConfig;
use crate::errors::{MarketError, MarketResult};
use crate::wallet::{BridgeError, Network, PaymentBridge, Receipt};

pub const PURCHASE_CHAPTER_SIG: &str = "purchaseChapter(uint256,uint256)";
pub const HAS_PURCHASED_SIG: &str = "hasPurchased(address,uint256,uint256)";

const USER_REJECTED_CODE: i64 = 4001;
const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcErrorBody {
    fn into_bridge_error(self) -> BridgeError {
        if self.code == USER_REJECTED_CODE {
            BridgeError::UserRejected
        } else if self.message.to_lowercase().contains("insufficient funds") {
            BridgeError::InsufficientFunds {
                message: self.message,
            }
        } else {
            BridgeError::Rpc {
                code: self.code,
                message: self.message,
            }
        }
    }
}

/// Talks to a wallet-enabled node that signs with its unlocked account.
pub struct JsonRpcBridge {
    http: Client,
    rpc_url: String,
    contract_address: String,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcBridge {
    pub fn from_config(config: &WalletConfig) -> MarketResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MarketError::config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            rpc_url: config.rpc_url.clone(),
            contract_address: config.contract_address.clone(),
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::debug!(method, id = request.id, "json-rpc call");

        let response: RpcResponse = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.error {
            Some(err) => Err(err.into_bridge_error()),
            None => Ok(response.result),
        }
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Receipt, BridgeError> {
        let started = Instant::now();
        loop {
            let value = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if !value.is_null() {
                let status = value.get("status").and_then(Value::as_str).unwrap_or("0x1");
                if parse_quantity(status)? == 0 {
                    return Err(BridgeError::Reverted {
                        tx_hash: tx_hash.to_string(),
                    });
                }
                let block_number = value
                    .get("blockNumber")
                    .and_then(Value::as_str)
                    .map(parse_quantity)
                    .transpose()?;
                return Ok(Receipt {
                    transaction_hash: tx_hash.to_string(),
                    block_number,
                });
            }

            if started.elapsed() >= self.confirmation_timeout {
                return Err(BridgeError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: self.confirmation_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl PaymentBridge for JsonRpcBridge {
    async fn request_accounts(&self) -> Result<Vec<String>, BridgeError> {
        let value = match self.call("eth_requestAccounts", json!([])).await {
            Err(BridgeError::Rpc { code, .. }) if code == METHOD_NOT_FOUND_CODE => {
                self.call("eth_accounts", json!([])).await?
            }
            other => other?,
        };
        serde_json::from_value(value)
            .map_err(|e| BridgeError::invalid_response(format!("accounts: {e}")))
    }

    async fn get_network(&self) -> Result<Network, BridgeError> {
        let value = self.call("eth_chainId", json!([])).await?;
        let chain_id = value
            .as_str()
            .ok_or_else(|| BridgeError::invalid_response("eth_chainId returned no string"))?;
        Ok(Network {
            chain_id: parse_quantity(chain_id)?,
        })
    }

    async fn submit_payment(
        &self,
        from: &str,
        story_id: u64,
        chapter_id: u64,
        value_wei: u128,
    ) -> Result<Receipt, BridgeError> {
        let data = encode_call(
            PURCHASE_CHAPTER_SIG,
            &[encode_u256(story_id), encode_u256(chapter_id)],
        );
        let tx = json!({
            "from": from,
            "to": self.contract_address,
            "value": format!("{value_wei:#x}"),
            "data": data,
        });

        let value = self.call("eth_sendTransaction", json!([tx])).await?;
        let tx_hash = value
            .as_str()
            .ok_or_else(|| BridgeError::invalid_response("eth_sendTransaction returned no hash"))?
            .to_string();
        tracing::info!(%tx_hash, story_id, chapter_id, "payment submitted, waiting for receipt");

        self.wait_for_receipt(&tx_hash).await
    }

    async fn has_purchased(
        &self,
        account: &str,
        story_id: u64,
        chapter_id: u64,
    ) -> Result<bool, BridgeError> {
        let data = encode_call(
            HAS_PURCHASED_SIG,
            &[
                encode_address(account)?,
                encode_u256(story_id),
                encode_u256(chapter_id),
            ],
        );
        let call = json!({ "to": self.contract_address, "data": data });
        let value = self.call("eth_call", json!([call, "latest"])).await?;
        let word = value
            .as_str()
            .ok_or_else(|| BridgeError::invalid_response("eth_call returned no data"))?;
        let bytes = hex::decode(word.trim_start_matches("0x"))
            .map_err(|e| BridgeError::invalid_response(format!("eth_call data: {e}")))?;
        Ok(bytes.iter().any(|b| *b != 0))
    }
}

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn encode_u256(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn encode_address(address: &str) -> Result<[u8; 32], BridgeError> {
    let raw = hex::decode(address.trim_start_matches("0x"))
        .map_err(|e| BridgeError::invalid_response(format!("address {address}: {e}")))?;
    if raw.len() != 20 {
        return Err(BridgeError::invalid_response(format!(
            "address {address} is not 20 bytes"
        )));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&raw);
    Ok(word)
}

/// Hex call data: selector followed by the 32-byte argument words.
pub fn encode_call(signature: &str, args: &[[u8; 32]]) -> String {
    let mut data = function_selector(signature).to_vec();
    for arg in args {
        data.extend_from_slice(arg);
    }
    format!("0x{}", hex::encode(data))
}

fn parse_quantity(value: &str) -> Result<u64, BridgeError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| BridgeError::invalid_response(format!("quantity {value}: {e}")))
}
