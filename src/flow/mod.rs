//! Vault flows
//!
//! Orchestrators for swap-and-deposit, withdraw, and early withdraw, plus the
//! display-only quote previewer. All of them are generic over the chain,
//! aggregator and backend traits so tests can drive them with mocks.

pub mod deposit;
pub mod guard;
pub mod preview;
pub mod status;
pub mod unwind;
pub mod withdraw;

use ethereum_types::{Address, H256, U256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::cache::{BalanceCache, CacheKey};
use crate::chains::{format_hash, is_native, Erc20Token, TxReceipt, WalletProvider};
use crate::config::{ClientConfig, FlowConfig, SupportedToken};
use crate::error::{FlowError, FlowResult};

/// Flow tuning plus the supported token list of every configured chain.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub flow: FlowConfig,
    tokens: HashMap<u64, Vec<SupportedToken>>,
}

impl FlowSettings {
    pub fn new(flow: FlowConfig, tokens: HashMap<u64, Vec<SupportedToken>>) -> Self {
        Self { flow, tokens }
    }

    /// Builds settings from a loaded configuration.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut tokens = HashMap::new();
        for chain in &config.chain {
            tokens.insert(chain.chain_id, chain.supported_tokens()?);
        }
        Ok(Self::new(config.flow.clone(), tokens))
    }

    /// Token list of `chain_id`.
    pub fn tokens_for(&self, chain_id: u64) -> FlowResult<&[SupportedToken]> {
        self.tokens
            .get(&chain_id)
            .map(|t| t.as_slice())
            .ok_or(FlowError::UnsupportedChain(chain_id))
    }

    pub fn find_token(&self, chain_id: u64, address: &Address) -> Option<&SupportedToken> {
        self.tokens.get(&chain_id)?.iter().find(|t| t.address == *address)
    }

    pub fn done_delay(&self) -> Duration {
        Duration::from_millis(self.flow.done_display_ms)
    }
}

/// Connected wallet and active chain, or the matching error.
pub(crate) fn active_wallet<C: WalletProvider>(chain: &C) -> FlowResult<(Address, u64)> {
    let wallet = chain.address().ok_or(FlowError::WalletUnavailable)?;
    let chain_id = chain.chain_id().ok_or(FlowError::WalletUnavailable)?;
    Ok((wallet, chain_id))
}

/// Waits for `tx_hash` and fails unless it succeeded.
pub(crate) async fn confirm<C: WalletProvider>(chain: &C, tx_hash: H256) -> FlowResult<TxReceipt> {
    let receipt = chain.wait_for_receipt(tx_hash).await?;
    if !receipt.success {
        return Err(FlowError::TransactionFailed(format_hash(&tx_hash)));
    }
    Ok(receipt)
}

/// Wallet balance of `token` through the cache; native sentinel reads the coin balance.
pub(crate) async fn cached_balance<C: WalletProvider + Erc20Token>(
    cache: &BalanceCache,
    chain: &C,
    chain_id: u64,
    token: Address,
    owner: Address,
) -> FlowResult<U256> {
    cache
        .get_or_fetch(CacheKey::balance(chain_id, token, owner), || async move {
            if is_native(&token) {
                chain.native_balance(owner).await
            } else {
                chain.balance_of(token, owner).await
            }
        })
        .await
}

pub(crate) async fn cached_allowance<C: Erc20Token>(
    cache: &BalanceCache,
    chain: &C,
    chain_id: u64,
    token: Address,
    owner: Address,
    spender: Address,
) -> FlowResult<U256> {
    cache
        .get_or_fetch(CacheKey::allowance(chain_id, token, owner, spender), || {
            chain.allowance(token, owner, spender)
        })
        .await
}

/// Display label of a token: the configured label, else the ERC-20 symbol.
pub(crate) async fn token_label<C: Erc20Token>(
    settings: &FlowSettings,
    chain: &C,
    chain_id: u64,
    token: Address,
) -> FlowResult<String> {
    if let Some(known) = settings.find_token(chain_id, &token) {
        return Ok(known.label.clone());
    }
    chain.symbol(token).await
}

/// Decimals of a token: configured value, else the ERC-20 `decimals()`.
pub(crate) async fn token_decimals<C: Erc20Token>(
    settings: &FlowSettings,
    chain: &C,
    chain_id: u64,
    token: Address,
) -> FlowResult<u8> {
    if let Some(known) = settings.find_token(chain_id, &token) {
        return Ok(known.decimals);
    }
    chain.decimals(token).await
}

/// Whether depositing `input` into a vault priced in `currency` needs a swap.
pub(crate) fn needs_swap(input_label: &str, currency_label: &str) -> bool {
    !input_label.eq_ignore_ascii_case(currency_label)
}

/// Logs and swallows a failed best-effort backend call.
pub(crate) fn best_effort(what: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!("{} failed (ignored): {:#}", what, e);
    }
}
