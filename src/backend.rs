//! Product Backend Client
//!
//! HTTP client for the product backend: product and position listings,
//! history, ref-code whitelist, unwind pricing, holder lists, bookkeeping
//! reports and admin mutations. Endpoints return bare JSON (no envelope).

use anyhow::{Context, Result};
use ethereum_types::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::chains::{format_address, parse_address};

// ============================================================================
// PRODUCT STRUCTURES
// ============================================================================

/// Issuance parameters of a product's current cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceCycle {
    /// Coupon rate as reported by the backend
    #[serde(default, deserialize_with = "flexible_f64")]
    pub coupon: f64,
    #[serde(default)]
    pub apy: Option<String>,
    /// Reference spot price of the underlying
    #[serde(default, deserialize_with = "flexible_f64")]
    pub underlying_spot_ref: f64,
    /// Option minimum order size (tenths of the underlying)
    #[serde(default, deserialize_with = "flexible_f64")]
    pub option_min_order_size: f64,
    /// Unix seconds
    #[serde(default)]
    pub issuance_date: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    pub maturity_date: Option<i64>,
}

/// A structured product (vault) as listed by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub underlying: String,
    #[serde(default)]
    pub currency_name: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub status: Option<u64>,
    /// In currency units (not base units)
    #[serde(default, deserialize_with = "flexible_f64")]
    pub max_capacity: f64,
    /// In currency units (not base units)
    #[serde(default, deserialize_with = "flexible_f64")]
    pub current_capacity: f64,
    #[serde(default)]
    pub estimated_apy: Option<String>,
    #[serde(default)]
    pub issuance_cycle: IssuanceCycle,
}

/// Per-block unwind price quoted by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwindPrice {
    /// Principal-token leg
    #[serde(default, deserialize_with = "flexible_f64")]
    pub amount_token: f64,
    /// Option leg
    #[serde(default, deserialize_with = "flexible_f64")]
    pub amount_option: f64,
}

/// Raw holder list response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HolderListResponse {
    #[serde(default)]
    owner_address: Vec<String>,
    #[serde(default)]
    balance_token: Vec<serde_json::Value>,
}

/// Holders of a vault token with their balances in base units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolderList {
    pub holders: Vec<Address>,
    pub balances: Vec<U256>,
}

/// Opaque history entry; the backend's schema varies per entry type.
pub type HistoryEntry = serde_json::Value;

// ============================================================================
// REPORT STRUCTURES
// ============================================================================

/// Bookkeeping report sent after a successful deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReport {
    pub chain_id: u64,
    pub product: String,
    pub address: String,
    pub txid: String,
    /// Deposited amount in currency base units
    pub amount: String,
    pub input_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_txid: Option<String>,
}

/// Report sent after a successful early withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequestReport {
    pub chain_id: u64,
    pub product: String,
    pub address: String,
    pub txid: String,
    pub amount_pt_unwind_price: f64,
    pub amount_option_unwind_price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnwindMarginUpdate {
    chain_id: u64,
    product_address: String,
    unwind_margin: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct EarlyWithdrawUpdate {
    chain_id: u64,
    product_address: String,
    is_early_withdraw: bool,
}

/// Accepts a number, a numeric string, or null.
fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(0.0),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(0.0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{}' is not a number", s))),
        Some(other) => Err(serde::de::Error::custom(format!("expected number, got {}", other))),
    }
}

/// Integer base-unit balance from a number or decimal string.
fn balance_from_json(value: &serde_json::Value) -> Result<U256> {
    let raw = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => anyhow::bail!("Invalid holder balance {}", other),
    };
    U256::from_dec_str(&raw).map_err(|_| anyhow::anyhow!("Invalid holder balance '{}'", raw))
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// The backend calls made from inside the flows.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Best-effort deposit bookkeeping.
    async fn report_deposit(&self, report: &DepositReport) -> Result<()>;

    /// Unwind price for `blocks` blocks of `vault` held by `wallet`.
    async fn unwind_price(
        &self,
        chain_id: u64,
        wallet: Address,
        vault: Address,
        blocks: u64,
    ) -> Result<UnwindPrice>;

    /// Best-effort early-withdraw bookkeeping.
    async fn report_withdraw_request(&self, report: &WithdrawRequestReport) -> Result<()>;
}

// ============================================================================
// BACKEND CLIENT
// ============================================================================

/// HTTP client for the product backend.
pub struct BackendClient {
    /// Base URL of the backend (e.g., "https://api.example.com")
    base_url: String,
    /// HTTP client instance
    client: reqwest::Client,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the backend
    ///
    /// # Returns
    ///
    /// * `Ok(BackendClient)` - New client instance
    /// * `Err(anyhow::Error)` - Failed to create HTTP client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send GET {} request", path))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend error on GET {}: {} {}", path, status, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse GET {} response", path))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T> {
        debug!("POST {}", path);
        let mut request = self.client.post(self.url(path)).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send POST {} request", path))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Backend error on POST {}: {} {}", path, status, body);
        }
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read POST {} response", path))?;
        // Some endpoints answer with an empty body
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).with_context(|| format!("Failed to parse POST {} response", path))
    }

    /// List products deployed on a chain.
    pub async fn products(&self, chain_id: u64) -> Result<Vec<Product>> {
        self.get_json("products", &[("chainId", chain_id.to_string())]).await
    }

    /// Get a single product.
    pub async fn product(&self, address: &Address, chain_id: u64) -> Result<Product> {
        let path = format!("products/{}", format_address(address));
        self.get_json(&path, &[("chainId", chain_id.to_string())]).await
    }

    /// Products the wallet holds a position in.
    pub async fn positions(&self, wallet: &Address) -> Result<Vec<Product>> {
        let path = format!("users/positions/{}", format_address(wallet));
        self.get_json(&path, &[]).await
    }

    /// Deposit/withdraw history of the wallet across chains.
    pub async fn history(&self, wallet: &Address) -> Result<Vec<HistoryEntry>> {
        let path = format!("users/history/{}", format_address(wallet));
        self.get_json(&path, &[]).await
    }

    /// On-chain transaction history of the wallet on one chain.
    pub async fn transaction_history(&self, wallet: &Address, chain_id: u64) -> Result<Vec<HistoryEntry>> {
        let path = format!("users/transaction-history/{}", format_address(wallet));
        self.get_json(&path, &[("chainId", chain_id.to_string())]).await
    }

    /// Whether the wallet has already redeemed a ref-code.
    pub async fn check_whitelist(&self, wallet: &Address) -> Result<bool> {
        let value: serde_json::Value = self
            .post_json::<(), _>(
                "refcodes/check-whitelist",
                &[("address", format_address(wallet))],
                None,
            )
            .await?;
        Ok(is_truthy(&value))
    }

    /// Redeems a ref-code for the wallet. `false` means the code was rejected.
    pub async fn sign_up(&self, refcode: &str, wallet: &Address) -> Result<bool> {
        let value: serde_json::Value = self
            .post_json::<(), _>(
                "refcodes/signUp",
                &[("refcode", refcode.to_string()), ("address", format_address(wallet))],
                None,
            )
            .await?;
        Ok(is_truthy(&value))
    }

    /// Vault token holders for coupon distribution.
    ///
    /// The first entry of the backend list is the vault's own mint account
    /// and is dropped.
    pub async fn holder_list(&self, vault: &Address, chain_id: u64) -> Result<HolderList> {
        let raw: HolderListResponse = self
            .post_json::<(), _>(
                "products/get-token-holder-list-final",
                &[
                    ("chainId", chain_id.to_string()),
                    ("productAddress", format_address(vault)),
                ],
                None,
            )
            .await?;

        if raw.owner_address.len() != raw.balance_token.len() {
            anyhow::bail!(
                "Holder list is inconsistent: {} owners, {} balances",
                raw.owner_address.len(),
                raw.balance_token.len()
            );
        }

        let mut list = HolderList::default();
        for (owner, balance) in raw.owner_address.iter().zip(raw.balance_token.iter()).skip(1) {
            list.holders.push(parse_address(owner)?);
            list.balances.push(balance_from_json(balance)?);
        }
        Ok(list)
    }

    /// Admin: set the unwind margin used for early-withdraw pricing.
    pub async fn set_unwind_margin(&self, chain_id: u64, vault: &Address, margin: f64) -> Result<()> {
        let body = UnwindMarginUpdate {
            chain_id,
            product_address: format_address(vault),
            unwind_margin: margin,
        };
        let _: serde_json::Value = self
            .post_json("products/update-unwind-margin", &[], Some(&body))
            .await?;
        Ok(())
    }

    /// Admin: enable or disable early withdrawal for a product.
    pub async fn set_early_withdraw(&self, chain_id: u64, vault: &Address, enabled: bool) -> Result<()> {
        let body = EarlyWithdrawUpdate {
            chain_id,
            product_address: format_address(vault),
            is_early_withdraw: enabled,
        };
        let _: serde_json::Value = self
            .post_json("products/update-early-withdraw", &[], Some(&body))
            .await?;
        Ok(())
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

impl Backend for BackendClient {
    async fn report_deposit(&self, report: &DepositReport) -> Result<()> {
        let _: serde_json::Value = self
            .post_json("products/update-deposit-request", &[], Some(report))
            .await?;
        Ok(())
    }

    async fn unwind_price(
        &self,
        chain_id: u64,
        wallet: Address,
        vault: Address,
        blocks: u64,
    ) -> Result<UnwindPrice> {
        self.post_json::<(), _>(
            "products/get-pt-and-position",
            &[
                ("chainId", chain_id.to_string()),
                ("walletAddress", format_address(&wallet)),
                ("productAddress", format_address(&vault)),
                ("noOfBlock", blocks.to_string()),
            ],
            None,
        )
        .await
    }

    async fn report_withdraw_request(&self, report: &WithdrawRequestReport) -> Result<()> {
        let _: serde_json::Value = self
            .post_json("products/update-withdraw-request", &[], Some(report))
            .await?;
        Ok(())
    }
}
