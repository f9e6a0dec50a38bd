//! EVM Chain Client
//!
//! JSON-RPC client for the wallet's node. Reads go through `eth_call`;
//! transactions are submitted with `eth_sendTransaction` from the configured
//! wallet, so signing happens in the node or the wallet behind it.

use ethereum_types::{Address, H256, U256};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::abi::{self, Token};
use super::{format_address, format_hash, Erc20Token, TxReceipt, TxRequest, VaultContract, VaultStatus, WalletProvider};
use crate::config::ChainConfig;
use crate::error::{classify_provider_error, FlowError, FlowResult};

/// EVM JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// EVM JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    #[serde(default)]
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    #[serde(default)]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Subset of a transaction receipt the flows need
#[derive(Debug, Deserialize)]
struct RawReceipt {
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    /// "0x1" on success, "0x0" on revert
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "blockNumber", default)]
    block_number: Option<String>,
}

/// Client for an EVM chain reached over JSON-RPC
pub struct EvmClient {
    /// HTTP client for JSON-RPC calls
    client: Client,
    /// RPC URL
    rpc_url: String,
    /// Configured chain ID
    chain_id: u64,
    /// Wallet used as `from` for transactions
    wallet: Option<Address>,
    /// Delay between receipt polls
    receipt_poll_interval: Duration,
    /// JSON-RPC request counter
    next_id: AtomicU64,
}

impl EvmClient {
    /// Creates a new EVM chain client
    ///
    /// # Arguments
    ///
    /// * `config` - Chain configuration
    /// * `wallet` - Connected wallet, `None` for read-only use
    /// * `receipt_poll_interval_ms` - Delay between receipt polls
    ///
    /// # Returns
    ///
    /// * `Ok(EvmClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create client
    pub fn new(config: &ChainConfig, wallet: Option<Address>, receipt_poll_interval_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy() // Avoid macOS system-configuration issues in tests
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            chain_id: config.chain_id,
            wallet,
            receipt_poll_interval: Duration::from_millis(receipt_poll_interval_ms),
            next_id: AtomicU64::new(1),
        })
    }

    /// Checks that the node serves the configured chain.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - `eth_chainId` matches the configured chain ID
    /// * `Err(anyhow::Error)` - Node unreachable or on another chain
    pub async fn verify_chain_id(&self) -> anyhow::Result<()> {
        let raw: String = self.rpc("eth_chainId", vec![]).await?;
        let remote = parse_quantity(&raw)?.low_u64();
        if remote != self.chain_id {
            anyhow::bail!(
                "RPC endpoint {} serves chain {}, expected {}",
                self.rpc_url,
                remote,
                self.chain_id
            );
        }
        info!("Connected to chain {} via {}", self.chain_id, self.rpc_url);
        Ok(())
    }

    async fn rpc_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> FlowResult<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        debug!("JSON-RPC {} -> {}", method, self.rpc_url);

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FlowError::Network(format!("Failed to send {} request: {}", method, e)))?
            .json()
            .await
            .map_err(|e| FlowError::Network(format!("Failed to parse {} response: {}", method, e)))?;

        if let Some(error) = response.error {
            debug!("JSON-RPC error on {}: {} ({})", method, error.message, error.code);
            return Err(classify_rpc_error(&error));
        }

        Ok(response.result)
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Vec<serde_json::Value>) -> FlowResult<T> {
        self.rpc_optional(method, params)
            .await?
            .ok_or_else(|| FlowError::Network(format!("{} returned no result", method)))
    }

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Vec<u8>) -> FlowResult<Vec<u8>> {
        let params = vec![
            serde_json::json!({
                "to": format_address(&to),
                "data": format!("0x{}", hex::encode(&data)),
            }),
            serde_json::json!("latest"),
        ];
        let raw: String = self.rpc("eth_call", params).await?;
        abi::decode_hex(&raw).map_err(|e| FlowError::Network(e.to_string()))
    }

    async fn call_uint(&self, to: Address, signature: &str, args: &[Token]) -> FlowResult<U256> {
        let out = self.call(to, abi::encode_call(signature, args)).await?;
        abi::decode_uint(&out).map_err(|e| FlowError::Network(format!("{}: {}", signature, e)))
    }

    async fn call_address(&self, to: Address, signature: &str) -> FlowResult<Address> {
        let out = self.call(to, abi::encode_call(signature, &[])).await?;
        abi::decode_address(&out).map_err(|e| FlowError::Network(format!("{}: {}", signature, e)))
    }

    /// Submits a contract call from the connected wallet.
    async fn transact(&self, to: Address, signature: &str, args: &[Token]) -> FlowResult<H256> {
        let from = self.wallet.ok_or(FlowError::WalletUnavailable)?;
        let tx = TxRequest {
            from,
            to,
            data: abi::encode_call(signature, args),
            value: U256::zero(),
            gas: None,
        };
        info!("Submitting {} to {}", signature, format_address(&to));
        self.send_transaction(&tx).await
    }
}

fn tx_to_json(tx: &TxRequest) -> serde_json::Value {
    let mut json = serde_json::json!({
        "from": format_address(&tx.from),
        "to": format_address(&tx.to),
        "data": format!("0x{}", hex::encode(&tx.data)),
        "value": format!("{:#x}", tx.value),
    });
    if let Some(gas) = tx.gas {
        json["gas"] = serde_json::json!(format!("{:#x}", gas));
    }
    json
}

/// Turns a JSON-RPC error into a [`FlowError`], decoding `Error(string)`
/// revert data when the node returns it separately from the message.
fn classify_rpc_error(error: &JsonRpcError) -> FlowError {
    let revert_reason = error
        .data
        .as_ref()
        .and_then(|d| d.as_str())
        .and_then(|d| abi::decode_hex(d).ok())
        .and_then(|bytes| abi::decode_revert_data(&bytes));

    match revert_reason {
        Some(reason) if !error.message.contains(&reason) => {
            classify_provider_error(Some(error.code), &format!("execution reverted: {}", reason))
        }
        _ => classify_provider_error(Some(error.code), &error.message),
    }
}

fn parse_quantity(raw: &str) -> FlowResult<U256> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16).map_err(|_| FlowError::Network(format!("Invalid quantity '{}'", raw)))
}

fn parse_hash(raw: &str) -> FlowResult<H256> {
    let bytes = abi::decode_hex(raw).map_err(|e| FlowError::Network(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(FlowError::Network(format!("Invalid transaction hash '{}'", raw)));
    }
    Ok(H256::from_slice(&bytes))
}

impl WalletProvider for EvmClient {
    fn address(&self) -> Option<Address> {
        self.wallet
    }

    fn chain_id(&self) -> Option<u64> {
        Some(self.chain_id)
    }

    async fn native_balance(&self, owner: Address) -> FlowResult<U256> {
        let raw: String = self
            .rpc(
                "eth_getBalance",
                vec![serde_json::json!(format_address(&owner)), serde_json::json!("latest")],
            )
            .await?;
        parse_quantity(&raw)
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> FlowResult<U256> {
        let raw: String = self.rpc("eth_estimateGas", vec![tx_to_json(tx)]).await?;
        parse_quantity(&raw)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> FlowResult<H256> {
        let raw: String = self.rpc("eth_sendTransaction", vec![tx_to_json(tx)]).await?;
        let hash = parse_hash(&raw)?;
        info!("Transaction submitted: {}", format_hash(&hash));
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> FlowResult<TxReceipt> {
        let hash = format_hash(&tx_hash);
        loop {
            let receipt: Option<RawReceipt> = self
                .rpc_optional("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
                .await?;

            match receipt {
                Some(raw) => {
                    let success = raw.status.as_deref().map(parse_quantity).transpose()?
                        != Some(U256::zero());
                    let block_number = raw
                        .block_number
                        .as_deref()
                        .map(parse_quantity)
                        .transpose()?
                        .map(|b| b.low_u64());
                    info!(
                        "Transaction {} mined in block {:?} (success: {})",
                        raw.transaction_hash, block_number, success
                    );
                    return Ok(TxReceipt {
                        transaction_hash: parse_hash(&raw.transaction_hash)?,
                        success,
                        block_number,
                    });
                }
                None => {
                    debug!("Receipt for {} not available yet", hash);
                    tokio::time::sleep(self.receipt_poll_interval).await;
                }
            }
        }
    }
}

impl Erc20Token for EvmClient {
    async fn balance_of(&self, token: Address, owner: Address) -> FlowResult<U256> {
        self.call_uint(token, "balanceOf(address)", &[Token::Address(owner)]).await
    }

    async fn decimals(&self, token: Address) -> FlowResult<u8> {
        let value = self.call_uint(token, "decimals()", &[]).await?;
        if value > U256::from(u8::MAX) {
            return Err(FlowError::Network(format!("decimals() returned {}", value)));
        }
        Ok(value.low_u32() as u8)
    }

    async fn symbol(&self, token: Address) -> FlowResult<String> {
        let out = self.call(token, abi::encode_call("symbol()", &[])).await?;
        abi::decode_string(&out).map_err(|e| FlowError::Network(format!("symbol(): {}", e)))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> FlowResult<U256> {
        self.call_uint(
            token,
            "allowance(address,address)",
            &[Token::Address(owner), Token::Address(spender)],
        )
        .await
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> FlowResult<H256> {
        self.transact(
            token,
            "approve(address,uint256)",
            &[Token::Address(spender), Token::Uint(amount)],
        )
        .await
    }
}

impl VaultContract for EvmClient {
    async fn vault_status(&self, vault: Address) -> FlowResult<VaultStatus> {
        let raw = self.call_uint(vault, "status()", &[]).await?;
        Ok(VaultStatus::from_raw(raw.low_u64()))
    }

    async fn vault_currency(&self, vault: Address) -> FlowResult<Address> {
        self.call_address(vault, "currency()").await
    }

    async fn vault_token(&self, vault: Address) -> FlowResult<Address> {
        self.call_address(vault, "tokenAddress()").await
    }

    async fn principal_token(&self, vault: Address) -> FlowResult<Address> {
        self.call_address(vault, "PT()").await
    }

    async fn current_capacity(&self, vault: Address) -> FlowResult<U256> {
        self.call_uint(vault, "currentCapacity()", &[]).await
    }

    async fn principal_balance(&self, vault: Address, owner: Address) -> FlowResult<U256> {
        self.call_uint(vault, "principalBalance(address)", &[Token::Address(owner)]).await
    }

    async fn coupon_balance(&self, vault: Address, owner: Address) -> FlowResult<U256> {
        self.call_uint(vault, "couponBalance(address)", &[Token::Address(owner)]).await
    }

    async fn option_balance(&self, vault: Address, owner: Address) -> FlowResult<U256> {
        self.call_uint(vault, "optionBalance(address)", &[Token::Address(owner)]).await
    }

    async fn coupon_rate(&self, vault: Address) -> FlowResult<U256> {
        // Static tuple return; the coupon is the first word.
        self.call_uint(vault, "issuanceCycle()", &[]).await
    }

    async fn deposit(&self, vault: Address, amount: U256) -> FlowResult<H256> {
        self.transact(vault, "deposit(uint256)", &[Token::Uint(amount)]).await
    }

    async fn withdraw_principal(&self, vault: Address) -> FlowResult<H256> {
        self.transact(vault, "withdrawPrincipal()", &[]).await
    }

    async fn withdraw_coupon(&self, vault: Address) -> FlowResult<H256> {
        self.transact(vault, "withdrawCoupon()", &[]).await
    }

    async fn withdraw_option(&self, vault: Address) -> FlowResult<H256> {
        self.transact(vault, "withdrawOption()", &[]).await
    }

    async fn early_withdraw(&self, vault: Address, blocks: u64) -> FlowResult<H256> {
        self.transact(vault, "earlyWithdraw(uint256)", &[Token::Uint(U256::from(blocks))])
            .await
    }

    async fn distribute_coupon(
        &self,
        vault: Address,
        holders: &[Address],
        amounts: &[U256],
    ) -> FlowResult<H256> {
        self.transact(
            vault,
            "coupon(address[],uint256[])",
            &[Token::AddressArray(holders.to_vec()), Token::UintArray(amounts.to_vec())],
        )
        .await
    }
}
