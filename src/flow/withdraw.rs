//! Withdraw flow
//!
//! Principal, coupon and option payouts are withdrawn with separate contract
//! calls. Principal comes back only while the vault is still accepting
//! deposits and requires approving the vault token first; coupon and option
//! can be claimed from Accepting onwards.

use ethereum_types::{Address, H256, U256};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::guard::{FlightGuard, FlightTicket};
use super::status::{StatusTrack, WithdrawStatus};
use super::{active_wallet, cached_allowance, confirm, token_decimals, FlowSettings};
use crate::amount::scale_decimals;
use crate::cache::BalanceCache;
use crate::chains::{format_address, ChainGateway, VaultStatus};
use crate::error::{FlowError, FlowResult};

/// Which payouts to withdraw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WithdrawSelection {
    pub principal: bool,
    pub coupon: bool,
    pub option: bool,
}

impl WithdrawSelection {
    pub fn all() -> Self {
        Self {
            principal: true,
            coupon: true,
            option: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.principal || self.coupon || self.option)
    }

    /// Button label, e.g. "WITHDRAW COUPON + PRINCIPAL".
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if self.coupon {
            parts.push("COUPON");
        }
        if self.option {
            parts.push("OPTION");
        }
        if self.principal {
            parts.push("PRINCIPAL");
        }
        if parts.is_empty() {
            return "WITHDRAW".to_string();
        }
        format!("WITHDRAW {}", parts.join(" + "))
    }
}

/// A wallet's position in one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPosition {
    pub status: VaultStatus,
    pub currency: Address,
    pub currency_decimals: u8,
    /// Amounts below are in currency base units
    pub principal: U256,
    pub coupon: U256,
    pub option: U256,
    pub vault_token: Address,
    pub vault_token_balance: U256,
    pub principal_token: Address,
    /// Principal-protected token held by the vault
    pub principal_token_held: U256,
}

impl VaultPosition {
    /// Payouts that a withdraw would actually move right now.
    pub fn withdrawable(&self) -> WithdrawSelection {
        WithdrawSelection {
            principal: self.status.allows_principal_withdraw() && !self.principal.is_zero(),
            coupon: self.status.allows_yield_withdraw() && !self.coupon.is_zero(),
            option: self.status.allows_yield_withdraw() && !self.option.is_zero(),
        }
    }
}

/// Reads the position of `owner` in `vault`.
pub async fn read_position<C: ChainGateway>(
    settings: &FlowSettings,
    chain: &C,
    chain_id: u64,
    vault: Address,
    owner: Address,
) -> FlowResult<VaultPosition> {
    let status = chain.vault_status(vault).await?;
    let currency = chain.vault_currency(vault).await?;
    let currency_decimals = token_decimals(settings, chain, chain_id, currency).await?;
    let vault_token = chain.vault_token(vault).await?;
    let principal_token = chain.principal_token(vault).await?;

    Ok(VaultPosition {
        status,
        currency,
        currency_decimals,
        principal: chain.principal_balance(vault, owner).await?,
        coupon: chain.coupon_balance(vault, owner).await?,
        option: chain.option_balance(vault, owner).await?,
        vault_token,
        vault_token_balance: chain.balance_of(vault_token, owner).await?,
        principal_token,
        principal_token_held: chain.balance_of(principal_token, vault).await?,
    })
}

/// Transactions sent by one withdraw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub approve_tx: Option<H256>,
    pub principal_tx: Option<H256>,
    pub option_tx: Option<H256>,
    pub coupon_tx: Option<H256>,
}

impl WithdrawOutcome {
    pub fn is_empty(&self) -> bool {
        self.principal_tx.is_none() && self.option_tx.is_none() && self.coupon_tx.is_none()
    }
}

pub struct WithdrawOrchestrator<C> {
    chain: Arc<C>,
    settings: Arc<FlowSettings>,
    cache: BalanceCache,
    guard: FlightGuard,
    status: StatusTrack<WithdrawStatus>,
}

impl<C: ChainGateway> WithdrawOrchestrator<C> {
    pub fn new(chain: Arc<C>, settings: Arc<FlowSettings>) -> Self {
        Self {
            chain,
            settings,
            cache: BalanceCache::new(),
            guard: FlightGuard::new(),
            status: StatusTrack::new("withdraw"),
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

    /// Withdraws the selected payouts from `vault`.
    ///
    /// # Arguments
    ///
    /// * `vault` - Vault to withdraw from
    /// * `selection` - Payouts to withdraw; must not be empty
    ///
    /// # Returns
    ///
    /// * `Ok(WithdrawOutcome)` - Transactions that were sent (zero-balance payouts are skipped)
    /// * `Err(FlowError)` - Flow aborted; status is NONE and the error is recorded
    pub async fn withdraw(&self, vault: Address, selection: WithdrawSelection) -> FlowResult<WithdrawOutcome> {
        if selection.is_empty() {
            return Err(self.abort(FlowError::NothingSelected));
        }
        let (wallet, chain_id) = active_wallet(self.chain.as_ref()).map_err(|e| self.abort(e))?;
        let _ticket: FlightTicket = self.guard.try_acquire(wallet)?;
        self.status.begin();

        match self.run(vault, selection, wallet, chain_id).await {
            Ok(outcome) => {
                self.status.set(WithdrawStatus::Done);
                tokio::time::sleep(self.settings.done_delay()).await;
                self.status.reset();
                Ok(outcome)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn abort(&self, e: FlowError) -> FlowError {
        error!("Withdraw failed: {} ({})", e.user_message(), e);
        self.status.record_error(&e);
        self.status.reset();
        e
    }

    async fn run(
        &self,
        vault: Address,
        selection: WithdrawSelection,
        wallet: Address,
        chain_id: u64,
    ) -> FlowResult<WithdrawOutcome> {
        let chain = self.chain.as_ref();
        let vault_status = chain.vault_status(vault).await?;
        if !vault_status.allows_yield_withdraw() {
            return Err(FlowError::WithdrawUnavailable(vault_status));
        }

        let mut outcome = WithdrawOutcome::default();

        if selection.principal {
            if vault_status.allows_principal_withdraw() {
                let principal = chain.principal_balance(vault, wallet).await?;
                if principal.is_zero() {
                    info!("No principal to withdraw from {}", format_address(&vault));
                } else {
                    outcome.approve_tx = self.approve_vault_token(vault, wallet, chain_id, principal).await?;
                    self.status.set(WithdrawStatus::Withdraw);
                    let tx = chain.withdraw_principal(vault).await?;
                    confirm(chain, tx).await?;
                    outcome.principal_tx = Some(tx);
                }
            } else {
                warn!(
                    "Vault {} is {}; principal is locked, skipping it",
                    format_address(&vault),
                    vault_status
                );
            }
        }

        if selection.option && !chain.option_balance(vault, wallet).await?.is_zero() {
            self.status.set(WithdrawStatus::Withdraw);
            let tx = chain.withdraw_option(vault).await?;
            confirm(chain, tx).await?;
            outcome.option_tx = Some(tx);
        }

        if selection.coupon && !chain.coupon_balance(vault, wallet).await?.is_zero() {
            self.status.set(WithdrawStatus::Withdraw);
            let tx = chain.withdraw_coupon(vault).await?;
            confirm(chain, tx).await?;
            outcome.coupon_tx = Some(tx);
        }

        if outcome.is_empty() {
            info!("Nothing withdrawable in {}", format_address(&vault));
        }
        self.cache.invalidate_owner(chain_id, wallet).await;
        Ok(outcome)
    }

    /// Approves the vault to pull the vault token backing `principal`, if needed.
    async fn approve_vault_token(
        &self,
        vault: Address,
        wallet: Address,
        chain_id: u64,
        principal: U256,
    ) -> FlowResult<Option<H256>> {
        let chain = self.chain.as_ref();
        let vault_token = chain.vault_token(vault).await?;
        let currency = chain.vault_currency(vault).await?;
        let currency_decimals = token_decimals(&self.settings, chain, chain_id, currency).await?;
        let token_decimals = chain.decimals(vault_token).await?;
        let amount = scale_decimals(principal, currency_decimals, token_decimals);

        let allowance = cached_allowance(&self.cache, chain, chain_id, vault_token, wallet, vault).await?;
        if allowance >= amount {
            return Ok(None);
        }

        self.status.set(WithdrawStatus::Approving);
        let tx = chain.approve(vault_token, vault, amount).await?;
        confirm(chain, tx).await?;
        self.cache.invalidate_token(chain_id, vault_token, wallet).await;
        Ok(Some(tx))
    }
}
