//! Early withdraw
//!
//! A position can be unwound before maturity in whole blocks. The backend
//! prices the unwind; the quote is only honoured for a short window, after
//! which it must be fetched again.

use ethereum_types::{Address, H256, U256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::guard::FlightGuard;
use super::status::{StatusTrack, WithdrawStatus};
use super::{active_wallet, best_effort, cached_allowance, confirm, FlowSettings};
use crate::amount::{decimal_to_units, to_f64};
use crate::backend::{Backend, IssuanceCycle, WithdrawRequestReport};
use crate::cache::BalanceCache;
use crate::chains::{format_address, format_hash, ChainGateway};
use crate::error::{FlowError, FlowResult};

/// Size of one unwind block in currency units: `spot × minOrderSize / 10`.
pub fn block_size(cycle: &IssuanceCycle) -> f64 {
    cycle.underlying_spot_ref * cycle.option_min_order_size / 10.0
}

/// Whole blocks that fit in `balance` (currency units).
pub fn total_blocks(balance: f64, block_size: f64) -> u64 {
    if block_size <= 0.0 || !balance.is_finite() {
        return 0;
    }
    (balance / block_size).floor() as u64
}

/// How a holder's vault-token balance splits into blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSizing {
    pub block_size: f64,
    pub total_blocks: u64,
    /// Vault token (`tokenAddress()`) being unwound
    pub token: Address,
    pub token_decimals: u8,
}

impl BlockSizing {
    /// Vault-token amount covering `blocks` blocks, in base units.
    pub fn amount_for(&self, blocks: u64) -> FlowResult<U256> {
        decimal_to_units(blocks as f64 * self.block_size, self.token_decimals)
    }
}

/// A priced early withdrawal.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindQuote {
    pub vault: Address,
    pub blocks: u64,
    pub sizing: BlockSizing,
    pub amount_token: f64,
    pub amount_option: f64,
    pub quoted_at: Instant,
    pub expires_at: Instant,
}

impl UnwindQuote {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

pub struct EarlyWithdrawOrchestrator<C, B> {
    chain: Arc<C>,
    backend: Arc<B>,
    settings: Arc<FlowSettings>,
    cache: BalanceCache,
    guard: FlightGuard,
    status: StatusTrack<WithdrawStatus>,
}

impl<C, B> EarlyWithdrawOrchestrator<C, B>
where
    C: ChainGateway,
    B: Backend,
{
    pub fn new(chain: Arc<C>, backend: Arc<B>, settings: Arc<FlowSettings>) -> Self {
        Self {
            chain,
            backend,
            settings,
            cache: BalanceCache::new(),
            guard: FlightGuard::new(),
            status: StatusTrack::new("early withdraw"),
        }
    }

    pub fn with_cache(mut self, cache: BalanceCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_guard(mut self, guard: FlightGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn status(&self) -> StatusTrack<WithdrawStatus> {
        self.status.clone()
    }

    /// Splits the wallet's vault-token balance into blocks.
    pub async fn sizing(&self, vault: Address, cycle: &IssuanceCycle) -> FlowResult<BlockSizing> {
        let (wallet, _) = active_wallet(self.chain.as_ref())?;
        let token = self.chain.vault_token(vault).await?;
        let token_decimals = self.chain.decimals(token).await?;
        let balance = self.chain.balance_of(token, wallet).await?;

        let size = block_size(cycle);
        Ok(BlockSizing {
            block_size: size,
            total_blocks: total_blocks(to_f64(balance, token_decimals), size),
            token,
            token_decimals,
        })
    }

    /// Prices an early withdrawal of `blocks` blocks.
    ///
    /// # Arguments
    ///
    /// * `vault` - Vault to unwind
    /// * `blocks` - Requested block count, `1..=total_blocks`
    /// * `cycle` - Issuance cycle of the vault's product
    ///
    /// # Returns
    ///
    /// * `Ok(UnwindQuote)` - Quote valid for `unwind_quote_ttl_secs`
    /// * `Err(FlowError::InvalidBlocks)` - Block count out of range
    /// * `Err(FlowError::Network)` - Backend pricing failed
    pub async fn quote(&self, vault: Address, blocks: u64, cycle: &IssuanceCycle) -> FlowResult<UnwindQuote> {
        let (wallet, chain_id) = active_wallet(self.chain.as_ref())?;
        let sizing = self.sizing(vault, cycle).await?;
        if blocks == 0 || blocks > sizing.total_blocks {
            return Err(FlowError::InvalidBlocks {
                requested: blocks,
                available: sizing.total_blocks,
            });
        }

        let price = self
            .backend
            .unwind_price(chain_id, wallet, vault, blocks)
            .await
            .map_err(|e| FlowError::Network(format!("unwind price: {:#}", e)))?;

        let quoted_at = Instant::now();
        info!(
            "Unwind quote for {} block(s) of {}: token {}, option {}",
            blocks,
            format_address(&vault),
            price.amount_token,
            price.amount_option
        );
        Ok(UnwindQuote {
            vault,
            blocks,
            sizing,
            amount_token: price.amount_token,
            amount_option: price.amount_option,
            quoted_at,
            expires_at: quoted_at + Duration::from_secs(self.settings.flow.unwind_quote_ttl_secs),
        })
    }

    /// Executes a quoted early withdrawal.
    ///
    /// Expired quotes are refused before any transaction is sent.
    pub async fn execute(&self, quote: &UnwindQuote) -> FlowResult<H256> {
        let (wallet, chain_id) = active_wallet(self.chain.as_ref()).map_err(|e| self.abort(e))?;
        let _ticket = self.guard.try_acquire(wallet)?;
        self.status.begin();

        match self.run(quote, wallet, chain_id).await {
            Ok(tx) => {
                self.status.set(WithdrawStatus::Done);
                tokio::time::sleep(self.settings.done_delay()).await;
                self.status.reset();
                Ok(tx)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn abort(&self, e: FlowError) -> FlowError {
        error!("Early withdraw failed: {} ({})", e.user_message(), e);
        self.status.record_error(&e);
        self.status.reset();
        e
    }

    async fn run(&self, quote: &UnwindQuote, wallet: Address, chain_id: u64) -> FlowResult<H256> {
        if quote.is_expired() {
            return Err(FlowError::QuoteExpired);
        }

        let chain = self.chain.as_ref();
        let token = quote.sizing.token;
        let amount = quote.sizing.amount_for(quote.blocks)?;

        let allowance = cached_allowance(&self.cache, chain, chain_id, token, wallet, quote.vault).await?;
        if allowance < amount {
            self.status.set(WithdrawStatus::Approving);
            let tx = chain.approve(token, quote.vault, amount).await?;
            confirm(chain, tx).await?;
            self.cache.invalidate_token(chain_id, token, wallet).await;
        }

        self.status.set(WithdrawStatus::Withdraw);
        let tx = chain.early_withdraw(quote.vault, quote.blocks).await?;
        let result = confirm(chain, tx).await;
        self.cache.invalidate_owner(chain_id, wallet).await;
        result?;
        info!("Early withdraw {} mined: {} block(s)", format_hash(&tx), quote.blocks);

        let report = WithdrawRequestReport {
            chain_id,
            product: format_address(&quote.vault),
            address: format_address(&wallet),
            txid: format_hash(&tx),
            amount_pt_unwind_price: quote.amount_token,
            amount_option_unwind_price: quote.amount_option,
        };
        best_effort(
            "Withdraw request report",
            self.backend.report_withdraw_request(&report).await,
        );
        Ok(tx)
    }
}
