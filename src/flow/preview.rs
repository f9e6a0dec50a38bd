//! Deposit preview
//!
//! Wallet balance and, when a swap is needed, the expected swap output for
//! the intent currently being edited. Display only: the deposit flow always
//! plans its own route.

use ethereum_types::{Address, U256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

use super::deposit::DepositIntent;
use super::{active_wallet, cached_balance, needs_swap, token_label, FlowSettings};
use crate::amount::parse_units;
use crate::cache::BalanceCache;
use crate::chains::{format_address, ChainGateway};
use crate::error::{FlowError, FlowResult};
use crate::swap::{RouteRequest, SwapAggregator};

#[derive(Debug, Clone, PartialEq)]
pub struct DepositPreview {
    pub wallet_balance: U256,
    pub input_decimals: u8,
    pub needs_swap: bool,
    /// Expected vault-currency amount; the input amount itself when no swap is needed
    pub expected_amount: U256,
    pub amount_out_usd: Option<f64>,
}

/// What a remembered preview was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PreviewKey {
    wallet: Address,
    chain_id: u64,
    intent: DepositIntent,
}

pub struct QuotePreviewer<C, S> {
    chain: Arc<C>,
    swap: Arc<S>,
    settings: Arc<FlowSettings>,
    cache: BalanceCache,
    last: Mutex<Option<(PreviewKey, DepositPreview)>>,
}

impl<C: ChainGateway, S: SwapAggregator> QuotePreviewer<C, S> {
    pub fn new(chain: Arc<C>, swap: Arc<S>, settings: Arc<FlowSettings>) -> Self {
        Self {
            chain,
            swap,
            settings,
            cache: BalanceCache::new(),
            last: Mutex::new(None),
        }
    }

    pub fn with_cache(mut self, cache: BalanceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Preview for `intent`; the previous result is returned while the
    /// intent, wallet and chain are all unchanged.
    pub async fn refresh(&self, intent: &DepositIntent) -> FlowResult<DepositPreview> {
        let (wallet, chain_id) = active_wallet(self.chain.as_ref())?;
        let key = PreviewKey {
            wallet,
            chain_id,
            intent: intent.clone(),
        };

        let mut last = self.last.lock().await;
        if let Some((previous, preview)) = last.as_ref() {
            if *previous == key {
                debug!("Preview unchanged for {}", intent.input_amount);
                return Ok(preview.clone());
            }
        }

        let preview = self.fetch(&key).await?;
        *last = Some((key, preview.clone()));
        Ok(preview)
    }

    /// Drops the remembered preview so the next refresh re-fetches.
    pub async fn clear(&self) {
        *self.last.lock().await = None;
    }

    async fn fetch(&self, key: &PreviewKey) -> FlowResult<DepositPreview> {
        let chain = self.chain.as_ref();
        let (wallet, chain_id, intent) = (key.wallet, key.chain_id, &key.intent);
        let input = self
            .settings
            .find_token(chain_id, &intent.input_token)
            .ok_or_else(|| FlowError::UnsupportedToken(format_address(&intent.input_token)))?
            .clone();

        let wallet_balance = cached_balance(&self.cache, chain, chain_id, input.address, wallet).await?;
        let amount_in = if intent.input_amount.trim().is_empty() {
            U256::zero()
        } else {
            parse_units(&intent.input_amount, input.decimals)?
        };

        let currency_label = token_label(&self.settings, chain, chain_id, intent.target_currency).await?;
        let swap_needed = needs_swap(&input.label, &currency_label);

        let mut preview = DepositPreview {
            wallet_balance,
            input_decimals: input.decimals,
            needs_swap: swap_needed,
            expected_amount: amount_in,
            amount_out_usd: None,
        };
        if !swap_needed || amount_in.is_zero() {
            return Ok(preview);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let quote = self
            .swap
            .quote_route(&RouteRequest {
                chain_id,
                token_in: input.address,
                token_out: intent.target_currency,
                amount_in,
                slippage_bps: self.settings.flow.quote_slippage_bps,
                deadline: now + self.settings.flow.route_deadline_secs,
            })
            .await?;
        preview.expected_amount = quote.amount_out;
        preview.amount_out_usd = quote.amount_out_usd;
        Ok(preview)
    }
}
